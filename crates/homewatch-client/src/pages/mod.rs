//! CRUD page controllers.
//!
//! Each page keeps its own list state and talks to one backend trait. Every
//! mutation is followed by a full refetch; every failure is reported once
//! through the page's [`Notifier`](crate::notice::Notifier) and returned.

pub mod events;
pub mod faces;
pub mod zones;

use thiserror::Error;

use homewatch_core::AuthoringError;

use crate::api::ApiError;

pub use events::EventsPage;
pub use faces::FacesPage;
pub use zones::ZonesPage;

#[derive(Error, Debug)]
pub enum PageError {
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Rejected before any request was made.
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Authoring(#[from] AuthoringError),
    #[error("no such record: {0}")]
    NotFound(i64),
}

impl PageError {
    pub fn user_message(&self) -> String {
        match self {
            PageError::Api(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory backends shared by the page tests.

    use std::cell::{Cell, RefCell};

    use crate::api::ApiError;

    /// Counts calls and can be told to fail the next one.
    #[derive(Default)]
    pub struct CallLog {
        pub calls: RefCell<Vec<String>>,
        pub fail_next: Cell<bool>,
    }

    impl CallLog {
        pub fn hit(&self, name: &str) -> Result<(), ApiError> {
            self.calls.borrow_mut().push(name.to_string());
            if self.fail_next.replace(false) {
                return Err(ApiError::Business(format!("{name} failed")));
            }
            Ok(())
        }

        pub fn count(&self, name: &str) -> usize {
            self.calls.borrow().iter().filter(|c| c.as_str() == name).count()
        }

        pub fn total(&self) -> usize {
            self.calls.borrow().len()
        }
    }
}
