//! Remote operations and the taints each one tolerates.

use portcullis_session::{Session, TaintSet, UntoleratedTaints, taint};
use rootcause::Report;
use std::fmt;

use crate::error::ConfigError;

/// Every operation served over RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    HealthCheck,
    ListOperations,
    WhoAmI,
    EditUser,
    GenerateEnrollmentLink,
    AuthorizeHttp,
    StartEnrollment,
    FinishEnrollment,
    StartLogin,
    FinishLogin,
}

impl Operation {
    pub const COUNT: usize = 10;

    /// All operations, in declaration order.
    pub const ALL: [Operation; Self::COUNT] = [
        Self::HealthCheck,
        Self::ListOperations,
        Self::WhoAmI,
        Self::EditUser,
        Self::GenerateEnrollmentLink,
        Self::AuthorizeHttp,
        Self::StartEnrollment,
        Self::FinishEnrollment,
        Self::StartLogin,
        Self::FinishLogin,
    ];

    /// The HTTP path the operation is served on.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::HealthCheck => "/rpc/Health/Check",
            Self::ListOperations => "/rpc/Reflection/ListOperations",
            Self::WhoAmI => "/rpc/User/WhoAmI",
            Self::EditUser => "/rpc/User/Edit",
            Self::GenerateEnrollmentLink => "/rpc/User/GenerateEnrollmentLink",
            Self::AuthorizeHttp => "/rpc/Session/AuthorizeHTTP",
            Self::StartEnrollment => "/rpc/Enrollment/Start",
            Self::FinishEnrollment => "/rpc/Enrollment/Finish",
            Self::StartLogin => "/rpc/Login/Start",
            Self::FinishLogin => "/rpc/Login/Finish",
        }
    }

    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.path() == path)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Maps every operation to the set of taints it tolerates.
#[derive(Debug, Clone)]
pub struct ToleranceTable {
    tolerated: [TaintSet; Operation::COUNT],
}

impl ToleranceTable {
    /// Builds a table that must name every operation exactly once.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing or repeated operation.
    pub fn new<'a, I>(entries: I) -> Result<Self, Report<ConfigError>>
    where
        I: IntoIterator<Item = (Operation, &'a [&'a str])>,
    {
        let mut slots: [Option<TaintSet>; Operation::COUNT] = Default::default();
        for (operation, taints) in entries {
            let slot = &mut slots[operation.index()];
            if slot.is_some() {
                return Err(ConfigError::DuplicateOperation { operation }.into());
            }
            *slot = Some(taints.iter().copied().collect());
        }
        if let Some(operation) = Operation::ALL
            .into_iter()
            .find(|op| slots[op.index()].is_none())
        {
            return Err(ConfigError::MissingOperation { operation }.into());
        }
        Ok(Self {
            tolerated: slots.map(Option::unwrap_or_default),
        })
    }

    /// The table the authority runs with.
    ///
    /// # Errors
    ///
    /// Returns an error if an operation was added without an entry here.
    pub fn standard() -> Result<Self, Report<ConfigError>> {
        const NONE: &[&str] = &[];
        const ANONYMOUS: &[&str] = &[taint::ANONYMOUS];
        const ENROLLMENT: &[&str] = &[taint::ENROLLMENT];
        const START_LOGIN: &[&str] = &[taint::START_LOGIN];
        Self::new([
            (Operation::HealthCheck, ANONYMOUS),
            (Operation::ListOperations, ANONYMOUS),
            (Operation::WhoAmI, ANONYMOUS),
            (Operation::EditUser, NONE),
            (Operation::GenerateEnrollmentLink, NONE),
            (Operation::AuthorizeHttp, ANONYMOUS),
            (Operation::StartEnrollment, ENROLLMENT),
            (Operation::FinishEnrollment, ENROLLMENT),
            (Operation::StartLogin, ANONYMOUS),
            (Operation::FinishLogin, START_LOGIN),
        ])
    }

    #[must_use]
    pub fn tolerated(&self, operation: Operation) -> &TaintSet {
        &self.tolerated[operation.index()]
    }

    /// # Errors
    ///
    /// Returns the session's taints that `operation` does not tolerate.
    pub fn check(&self, operation: Operation, session: &Session) -> Result<(), UntoleratedTaints> {
        session.taints().check(self.tolerated(operation))
    }
}
