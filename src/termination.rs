//! Defines the [`Termination`] trait and the application's [`Failure`] type.

use std::{fmt, process};

/// Outcome of the application code, mapped to a process exit status.
///
/// The window event loop never returns control to `main`, so the GUI exits the process itself
/// once the application code has finished, using the [`Termination`] value it returned.
pub trait Termination {
    /// Returns the status code to exit the process with.
    fn exit_code(&self) -> i32;

    /// Prints a description of the failure (if any) to *stderr*.
    fn report(&self) {}

    /// Reports the outcome and exits the process.
    fn exit(self) -> !
    where
        Self: Sized,
    {
        self.report();
        process::exit(self.exit_code())
    }
}

impl Termination for () {
    fn exit_code(&self) -> i32 {
        0
    }
}

impl<T: Termination> Termination for Result<T, Failure> {
    fn exit_code(&self) -> i32 {
        match self {
            Ok(term) => term.exit_code(),
            Err(failure) => failure.exit_code(),
        }
    }

    fn report(&self) {
        match self {
            Ok(term) => term.report(),
            Err(failure) => failure.report(),
        }
    }
}

/// Why the application stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The capture device could not be opened or configured.
    Camera,
    /// A configuration value was invalid.
    Config,
    /// Anything else.
    Other,
}

/// A fatal application error together with the exit status it maps to.
pub struct Failure {
    kind: FailureKind,
    error: anyhow::Error,
}

impl Failure {
    /// The capture device could not be initialized. Exits with status -1.
    pub fn camera(error: anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Camera,
            error: error.context("Could not initialize camera"),
        }
    }

    /// Invalid configuration. Exits with status 1.
    pub fn config(error: anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Config,
            error: error.context("Invalid configuration"),
        }
    }

    #[inline]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the message printed by [`Termination::report`].
    pub fn message(&self) -> String {
        format!("Error: {:#}", self.error)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Self {
            kind: FailureKind::Other,
            error,
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {:#}", self.kind, self.error)
    }
}

impl Termination for Failure {
    fn exit_code(&self) -> i32 {
        match self.kind {
            FailureKind::Camera => -1,
            FailureKind::Config | FailureKind::Other => 1,
        }
    }

    fn report(&self) {
        eprintln!("{}", self.message());
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(().exit_code(), 0);
        assert_eq!(Ok::<(), Failure>(()).exit_code(), 0);
        assert_eq!(Failure::camera(anyhow!("no device")).exit_code(), -1);
        assert_eq!(Failure::config(anyhow!("bad value")).exit_code(), 1);
        assert_eq!(Failure::from(anyhow!("oops")).exit_code(), 1);
        assert_eq!(Err::<(), _>(Failure::camera(anyhow!("x"))).exit_code(), -1);
    }

    #[test]
    fn camera_message() {
        let failure = Failure::camera(anyhow!("/dev/video0: No such file or directory"));
        assert_eq!(failure.kind(), FailureKind::Camera);
        assert_eq!(
            failure.message(),
            "Error: Could not initialize camera: /dev/video0: No such file or directory"
        );
    }
}
