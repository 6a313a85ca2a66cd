#![forbid(unsafe_code)]

pub mod reconcile;

pub mod ids {
    /// Reference to a project or version as supplied by build tooling: either the
    /// numeric row id or the human name.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub enum Specifier {
        Id(i64),
        Name(String),
    }

    impl Specifier {
        pub fn id(value: i64) -> Result<Self, SpecifierError> {
            if value <= 0 {
                return Err(SpecifierError::NonPositiveId);
            }
            Ok(Self::Id(value))
        }

        pub fn name(value: impl Into<String>) -> Result<Self, SpecifierError> {
            let value = value.into();
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(SpecifierError::EmptyName);
            }
            if trimmed.len() > MAX_NAME_LEN {
                return Err(SpecifierError::TooLong);
            }
            Ok(Self::Name(trimmed.to_string()))
        }
    }

    impl std::fmt::Display for Specifier {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Id(id) => write!(f, "id={id}"),
                Self::Name(name) => write!(f, "name={name}"),
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SpecifierError {
        NonPositiveId,
        EmptyName,
        TooLong,
    }

    pub const MAX_NAME_LEN: usize = 255;

    /// Testcase key, unique per project.
    #[derive(Clone, Debug, PartialEq, Eq, Hash)]
    pub struct TestcaseKey(String);

    impl TestcaseKey {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, TestcaseKeyError> {
            let value = value.into();
            validate_testcase_key(&value)?;
            Ok(Self(value))
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum TestcaseKeyError {
        Empty,
        TooLong,
        SurroundingWhitespace,
        InvalidChar { ch: char, index: usize },
    }

    fn validate_testcase_key(value: &str) -> Result<(), TestcaseKeyError> {
        if value.is_empty() {
            return Err(TestcaseKeyError::Empty);
        }
        if value.len() > MAX_NAME_LEN {
            return Err(TestcaseKeyError::TooLong);
        }
        if value.trim() != value {
            return Err(TestcaseKeyError::SurroundingWhitespace);
        }
        for (index, ch) in value.chars().enumerate() {
            if ch.is_control() {
                return Err(TestcaseKeyError::InvalidChar { ch, index });
            }
        }
        Ok(())
    }
}

pub mod model {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum TestcaseStatus {
        Passed,
        Failed,
        Todo,
        Candidate,
        Candidate2,
    }

    impl TestcaseStatus {
        pub const ALL: [TestcaseStatus; 5] = [
            TestcaseStatus::Passed,
            TestcaseStatus::Failed,
            TestcaseStatus::Todo,
            TestcaseStatus::Candidate,
            TestcaseStatus::Candidate2,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                TestcaseStatus::Passed => "passed",
                TestcaseStatus::Failed => "failed",
                TestcaseStatus::Todo => "todo",
                TestcaseStatus::Candidate => "candidate",
                TestcaseStatus::Candidate2 => "candidate2",
            }
        }

        pub fn parse(raw: &str) -> Option<Self> {
            let raw = raw.trim();
            Self::ALL
                .into_iter()
                .find(|status| status.as_str().eq_ignore_ascii_case(raw))
        }

        /// Awaiting a new trial (previously failed or previously passed).
        pub fn is_unverified(self) -> bool {
            matches!(self, TestcaseStatus::Candidate | TestcaseStatus::Candidate2)
        }

        /// Carries a trial verdict.
        pub fn is_verified(self) -> bool {
            matches!(self, TestcaseStatus::Passed | TestcaseStatus::Failed)
        }

        pub fn bucket(self) -> Bucket {
            match self {
                TestcaseStatus::Passed => Bucket::Passed,
                TestcaseStatus::Failed => Bucket::Failed,
                TestcaseStatus::Todo => Bucket::Todo,
                TestcaseStatus::Candidate | TestcaseStatus::Candidate2 => Bucket::Unverified,
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum TrialStatus {
        Compiling,
        Pending,
        Running,
        Failed,
        Passed,
    }

    impl TrialStatus {
        pub const ALL: [TrialStatus; 5] = [
            TrialStatus::Compiling,
            TrialStatus::Pending,
            TrialStatus::Running,
            TrialStatus::Failed,
            TrialStatus::Passed,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                TrialStatus::Compiling => "compiling",
                TrialStatus::Pending => "pending",
                TrialStatus::Running => "running",
                TrialStatus::Failed => "failed",
                TrialStatus::Passed => "passed",
            }
        }

        pub fn parse(raw: &str) -> Option<Self> {
            let raw = raw.trim();
            Self::ALL
                .into_iter()
                .find(|status| status.as_str().eq_ignore_ascii_case(raw))
        }

        pub fn is_terminal(self) -> bool {
            matches!(self, TrialStatus::Passed | TrialStatus::Failed)
        }

        /// Position in the lifecycle; both verdicts share the last stage.
        pub fn stage(self) -> u8 {
            match self {
                TrialStatus::Compiling => 0,
                TrialStatus::Pending => 1,
                TrialStatus::Running => 2,
                TrialStatus::Failed | TrialStatus::Passed => 3,
            }
        }

        /// Testcase status carried by a finished trial.
        pub fn verdict(self) -> Option<TestcaseStatus> {
            match self {
                TrialStatus::Passed => Some(TestcaseStatus::Passed),
                TrialStatus::Failed => Some(TestcaseStatus::Failed),
                _ => None,
            }
        }
    }

    /// Snapshot partition a testcase belongs to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub enum Bucket {
        Passed,
        Failed,
        Todo,
        Unverified,
    }

    impl Bucket {
        pub const ALL: [Bucket; 4] = [
            Bucket::Passed,
            Bucket::Failed,
            Bucket::Todo,
            Bucket::Unverified,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                Bucket::Passed => "passed",
                Bucket::Failed => "failed",
                Bucket::Todo => "todo",
                Bucket::Unverified => "unverified",
            }
        }

        pub fn parse(raw: &str) -> Option<Self> {
            let raw = raw.trim();
            Self::ALL
                .into_iter()
                .find(|bucket| bucket.as_str().eq_ignore_ascii_case(raw))
        }
    }
}
