//! Browser driver seam.
//!
//! The pipeline only needs a handful of capabilities from a browser: open a
//! session, navigate, find an element by one [`Locator`], click, fill, press
//! a key, screenshot, close. [`EokaDriver`] provides them over CDP; tests
//! substitute an in-memory page.

mod chrome;

pub use chrome::{EokaDriver, EokaSession};

use crate::Result;
use async_trait::async_trait;
use std::fmt;

/// One concrete way of locating an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Raw CSS selector.
    Css(String),
    /// Element id contains the keyword (case-insensitive).
    IdContains(String),
    /// `name` attribute contains the keyword.
    NameContains(String),
    /// Placeholder text contains the phrase.
    Placeholder(String),
    /// Accessible name: `aria-label`, associated `<label>`, or `title`.
    Label(String),
    /// Visible text of an interactive element.
    Text(String),
    /// Visible text of any element.
    VisibleText(String),
    /// ARIA role (explicit or implicit), optionally narrowed by name.
    Role { role: String, name: Option<String> },
    /// Any visible text-entry field.
    AnyInput,
}

impl Locator {
    pub fn role(role: &str) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
        }
    }

    pub fn role_named(role: &str, name: &str) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name.into()),
        }
    }

    /// Strategy name and argument, as passed to the page-side resolver.
    pub fn as_args(&self) -> (&'static str, &str, &str) {
        match self {
            Self::Css(v) => ("css", v, ""),
            Self::IdContains(v) => ("id", v, ""),
            Self::NameContains(v) => ("name", v, ""),
            Self::Placeholder(v) => ("placeholder", v, ""),
            Self::Label(v) => ("label", v, ""),
            Self::Text(v) => ("text", v, ""),
            Self::VisibleText(v) => ("visible_text", v, ""),
            Self::Role { role, name } => ("role", role, name.as_deref().unwrap_or("")),
            Self::AnyInput => ("input", "", ""),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role:{}[{}]", role, name),
            Self::AnyInput => f.write_str("input:*"),
            other => {
                let (kind, value, _) = other.as_args();
                write!(f, "{}:{}", kind, value)
            }
        }
    }
}

/// A located element, addressable by a unique CSS selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub selector: String,
    pub tag: String,
    pub text: String,
}

/// Launches browser sessions.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Open a fresh, isolated session.
    async fn open(&self) -> Result<Box<dyn Session>>;
}

/// One live browser context (browser process + page).
///
/// Owned by exactly one workflow attempt and consumed by [`Session::close`].
#[async_trait]
pub trait Session: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// First visible, interactable element matching `locator`, if any.
    async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()>;

    async fn press_key(&self, key: &str) -> Result<()>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn close(self: Box<Self>) -> Result<()>;
}
