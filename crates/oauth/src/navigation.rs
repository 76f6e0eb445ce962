use std::sync::{Mutex, PoisonError};

/// Where a reconciled callback sends the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// A same-origin path, usually the `next` parameter.
    Destination(String),
    /// The error page, carrying a machine code and a human description.
    Error { code: String, description: String },
}

impl Navigation {
    pub fn error(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Render as a URL; errors go to `error_page` as query parameters.
    pub fn to_url(&self, error_page: &str) -> String {
        match self {
            Self::Destination(path) => path.clone(),
            Self::Error { code, description } => format!(
                "{error_page}?error={}&error_description={}",
                urlencoding::encode(code),
                urlencoding::encode(description)
            ),
        }
    }
}

/// Capability to move the user somewhere. Each reconciler entry point
/// supplies its own (HTTP redirect, JSON response, ...).
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: Navigation);
}

/// Navigator that records every navigation it is asked to perform.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    targets: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self) -> Vec<Navigation> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Navigation> {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: Navigation) {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target);
    }
}

/// Resolve the post-login destination. Only same-origin absolute paths are
/// honoured; anything else falls back to `default`.
///
/// Browsers drop tab and newline characters while parsing a `Location`, so a
/// path carrying any control character is rejected outright.
pub fn sanitize_next(next: Option<&str>, default: &str) -> String {
    match next {
        Some(path) if is_local_path(path) => path.to_string(),
        _ => default.to_string(),
    }
}

fn is_local_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix('/') else {
        return false;
    };
    !rest.starts_with('/')
        && !path.contains('\\')
        && !path.chars().any(char::is_control)
}
