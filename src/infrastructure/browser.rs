use crate::infrastructure::error::InfraError;
use url::Url;

pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &Url) -> Result<(), InfraError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WebBrowserOpener;

impl UrlOpener for WebBrowserOpener {
    fn open(&self, url: &Url) -> Result<(), InfraError> {
        webbrowser::open(url.as_str()).map_err(|error| InfraError::OpenUrl {
            url: url.to_string(),
            reason: error.to_string(),
        })
    }
}
