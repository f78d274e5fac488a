use std::fmt;

/// One ordered step of the frame pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Prepare,
    LoadTarget,
    Extract,
    Transform,
    Reassemble,
    RestoreAudio,
    Finalize,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 7] = [
        Stage::Prepare,
        Stage::LoadTarget,
        Stage::Extract,
        Stage::Transform,
        Stage::Reassemble,
        Stage::RestoreAudio,
        Stage::Finalize,
    ];

    /// Short identifier used in logs and events.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::LoadTarget => "load_target",
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Reassemble => "reassemble",
            Stage::RestoreAudio => "restore_audio",
            Stage::Finalize => "finalize",
        }
    }

    /// Human-readable status message shown to callers.
    pub fn message(self) -> &'static str {
        match self {
            Stage::Prepare => "Initializing processing",
            Stage::LoadTarget => "Loading target face",
            Stage::Extract => "Extracting frames",
            Stage::Transform => "Processing frames",
            Stage::Reassemble => "Creating video",
            Stage::RestoreAudio => "Restoring audio",
            Stage::Finalize => "Finalizing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_in_declaration_order() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
    }
}
