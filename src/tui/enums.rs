//! Enumerations for TUI state management.

/// Which screen has the keyboard.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Screen {
    Board,
    Detail,
    Response,
    EvidenceForm,
    TaskForm,
    Picker,
    Help,
    Confirm,
}

/// Steps of the level, role, person picker.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PickerStage {
    Level,
    Role,
    Person,
}

/// What a picked person is used for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PickerPurpose {
    Browse,
    Assignee,
    Assigner,
    Collaborator,
}

impl PickerPurpose {
    pub fn title(self) -> &'static str {
        match self {
            PickerPurpose::Browse => "People",
            PickerPurpose::Assignee => "Choose assignee",
            PickerPurpose::Assigner => "Choose assigner",
            PickerPurpose::Collaborator => "Add collaborator",
        }
    }
}

/// Destructive action waiting for a yes/no.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum PendingAction {
    RemoveEvidence { task: u64, evidence: String },
}

impl PendingAction {
    pub fn describe(&self) -> String {
        match self {
            PendingAction::RemoveEvidence { task, evidence } => {
                format!("remove evidence {evidence} from task #{task}")
            }
        }
    }
}
