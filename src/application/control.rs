use crate::infrastructure::error::InfraError;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    UpdateTimeOffset {
        #[serde(rename = "timeOffset")]
        time_offset: i64,
    },
}

pub fn parse_line(line: &str) -> Result<Option<ControlMessage>, InfraError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

pub async fn forward_control_messages<R>(reader: R, sender: mpsc::Sender<ControlMessage>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(%error, "control input closed with an error");
                break;
            }
        };
        match parse_line(&line) {
            Ok(Some(message)) => {
                if sender.send(message).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, line = %line, "ignoring control message"),
        }
    }
    tracing::debug!("control input finished");
}

pub fn spawn_stdin_reader(sender: mpsc::Sender<ControlMessage>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(forward_control_messages(
        tokio::io::BufReader::new(tokio::io::stdin()),
        sender,
    ))
}
