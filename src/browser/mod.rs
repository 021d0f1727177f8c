//! Browser automation over WebDriver
//!
//! [`WebDriverSessionFactory`] opens Chrome sessions against a running
//! WebDriver endpoint (chromedriver, Selenium) and hands them to the export
//! workflow as [`PortalSession`]s, which know the portal's and the database
//! site's page structure.

mod client;
mod download;
mod portal;

pub use client::{ElementRef, Locator, WebDriverClient, xpath_literal};
pub use download::{move_into_place, snapshot, wait_for_download};
pub use portal::{PortalSession, WebDriverSessionFactory, chrome_capabilities};
