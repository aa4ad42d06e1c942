use strum::{EnumCount, EnumIter, FromRepr};

/// Milestones of a deployment, in the order they are reached.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumCount,
    EnumIter,
    FromRepr,
)]
#[repr(u8)]
pub enum Step {
    #[default]
    Idle = 0,
    Submitted = 1,
    Confirming = 2,
    Validating = 3,
    Mined = 4,
    Deployed = 5,
}

impl Step {
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Cosmetic progress for a mining-wait tick. Never reaches `Mined`.
    pub fn confirming(self) -> Self {
        match self {
            Step::Submitted => Step::Confirming,
            Step::Confirming => Step::Validating,
            other => other,
        }
    }

    pub fn is_penultimate(self) -> bool {
        self.index() as usize == Step::COUNT - 2
    }

    pub fn is_terminal(self) -> bool {
        self == Step::Deployed
    }

    pub fn label(self) -> &'static str {
        match self {
            Step::Idle => "Waiting for transaction confirmation",
            Step::Submitted => "Transaction submitted",
            Step::Confirming => "Validating transaction",
            Step::Validating => "Deploying smart contract",
            Step::Mined => "Generating your contract",
            Step::Deployed => "Success",
        }
    }

    pub fn description(self) -> Option<&'static str> {
        match self {
            Step::Idle => Some("Please confirm the creation in your wallet"),
            Step::Mined => Some("Waiting for the contract code to go live"),
            Step::Deployed => Some("Your contract was created successfully"),
            _ => None,
        }
    }

    pub fn instruction(self) -> Option<&'static str> {
        match self {
            Step::Submitted | Step::Confirming | Step::Validating => Some(
                "This process can take a few minutes, keep this terminal open",
            ),
            _ => None,
        }
    }

    /// Text shown for the step, preferring the longer description.
    pub fn status(self) -> &'static str {
        self.description().unwrap_or_else(|| self.label())
    }
}
