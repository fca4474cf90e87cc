use std::{borrow::Cow, fmt, time::Duration};

use async_trait::async_trait;
use url::Url;

/// A way of finding an element on the identity provider's page.
///
/// The sign-in flow addresses the provider's UI by element presence, which is
/// inherently coupled to the UI's current structure. Keeping locators as data
/// (see the table in the `login` module) means a layout change is a data
/// change, not a control-flow change.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Locator {
    /// A CSS selector.
    Css(Cow<'static, str>),

    /// An element of the given tag whose rendered text contains `needle`.
    Text {
        /// The tag name to match (e.g. `span`).
        tag: &'static str,

        /// The text the element must contain.
        needle: Cow<'static, str>,
    },
}

impl Locator {
    /// Construct a CSS selector locator.
    pub fn css(selector: impl Into<Cow<'static, str>>) -> Self {
        Self::Css(selector.into())
    }

    /// Construct a text-content locator for elements with the given tag.
    pub fn text(tag: &'static str, needle: impl Into<Cow<'static, str>>) -> Self {
        Self::Text {
            tag,
            needle: needle.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "{selector}"),
            Self::Text { tag, needle } => write!(f, "{tag} containing '{needle}'"),
        }
    }
}

/// Options for [`UiSession::wait_for`].
#[derive(Clone, Copy, Debug)]
pub struct WaitOpts {
    /// Require the element to be visible, not merely attached.
    pub visible: bool,

    /// How long to wait before giving up, or `None` to wait forever.
    ///
    /// Unbounded waits are reserved for steps that depend on an out-of-band
    /// human action (approving a phone call or an authenticator prompt),
    /// where no timeout is meaningful.
    pub timeout: Option<Duration>,
}

impl WaitOpts {
    /// Wait up to `timeout` for the element to be attached.
    #[must_use]
    pub fn bounded(timeout: Duration) -> Self {
        Self {
            visible: false,
            timeout: Some(timeout),
        }
    }

    /// Wait forever for the element to be attached.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            visible: false,
            timeout: None,
        }
    }

    /// Additionally require the element to be visible.
    #[must_use]
    pub fn visible(self) -> Self {
        Self {
            visible: true,
            ..self
        }
    }
}

/// A browser page driven through one sign-in attempt.
///
/// The sign-in state machine depends only on this interface, so the
/// underlying engine (chromiumoxide in this crate, see [`ChromiumSession`])
/// can be swapped without touching the flow, and tests can script a fake.
///
/// [`ChromiumSession`]: crate::ChromiumSession
#[async_trait]
pub trait UiSession {
    /// Open the given URL in the session's page.
    async fn navigate(&self, url: &Url) -> Result<(), SessionError>;

    /// Suspend until the element is present (and visible, if requested).
    ///
    /// # Errors
    ///
    /// Fails with [`SessionError::ElementNotFound`] if the element has not
    /// appeared when the bound in `opts` elapses.
    async fn wait_for(&self, locator: &Locator, opts: WaitOpts) -> Result<(), SessionError>;

    /// Like [`wait_for`](Self::wait_for), but reports absence as `false`
    /// instead of failing.
    ///
    /// Used exclusively to detect UI variants whose presence cannot be known
    /// in advance.
    async fn probe(&self, locator: &Locator, timeout: Duration) -> bool {
        self.wait_for(locator, WaitOpts::bounded(timeout)).await.is_ok()
    }

    /// Type `text` into the element.
    async fn type_text(&self, locator: &Locator, text: &str) -> Result<(), SessionError>;

    /// Click the element.
    async fn click(&self, locator: &Locator) -> Result<(), SessionError>;

    /// Read the element's rendered text.
    async fn read_text(&self, locator: &Locator) -> Result<String, SessionError>;
}

/// An error from a browser interaction.
#[derive(Debug)]
pub enum SessionError {
    /// The awaited element never appeared within the wait's bound.
    ElementNotFound(String),

    /// The underlying browser engine failed.
    ///
    /// The error message should be sufficient to aid end-user debugging.
    Engine(String),
}

impl SessionError {
    pub(crate) fn engine(error: impl fmt::Display) -> Self {
        Self::Engine(error.to_string())
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ElementNotFound(locator) => {
                write!(f, "element {locator} did not appear in time")
            }
            Self::Engine(message) => write!(f, "browser failure: {message}"),
        }
    }
}

impl std::error::Error for SessionError {}
