pub mod batch_file;
pub mod browser;
pub mod markup;
pub mod portal;
pub mod webdriver;

#[cfg(test)]
pub(crate) mod testing;

pub use batch_file::BatchFileSource;
pub use browser::{Browser, BrowserError};
pub use portal::{Credentials, PortalScraper, PortalSelectors, PortalTimeouts, ScrapeError};
pub use webdriver::WebDriverBrowser;
