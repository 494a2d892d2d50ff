//! Phrase → action table.

use crate::remote::RemoteAction;

/// One row of the command table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    /// Equivalent phrases; any one of them contained in an utterance matches.
    pub triggers: Vec<String>,
    /// Executed in order, each awaited before the next.
    pub actions: Vec<RemoteAction>,
    /// Acknowledgment shown once the first action succeeds.
    pub ack_label: String,
}

impl CommandEntry {
    /// Triggers are lowercased and trimmed; empty ones are dropped since an
    /// empty phrase would match every utterance.
    pub fn new<T, S>(triggers: T, actions: impl Into<Vec<RemoteAction>>, ack_label: &str) -> Self
    where
        T: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let triggers = triggers
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            triggers,
            actions: actions.into(),
            ack_label: ack_label.to_string(),
        }
    }

    /// `true` when any trigger is a substring of `utterance`.
    pub fn matches(&self, utterance: &str) -> bool {
        self.triggers.iter().any(|t| utterance.contains(t.as_str()))
    }
}

/// Insertion-ordered command table with an optional priority clip entry.
///
/// Built once per worker and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    clip: Option<CommandEntry>,
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new(clip: Option<CommandEntry>, entries: Vec<CommandEntry>) -> Self {
        Self { clip, entries }
    }

    /// The stock OBS phrases, each prefixed with `wake_word`.
    ///
    /// ```
    /// use obs_voice_control::commands::CommandTable;
    ///
    /// let table = CommandTable::standard("Freya");
    /// let hits = table.lookup("freya start everything");
    /// assert_eq!(hits.len(), 1);
    /// assert_eq!(hits[0].ack_label, "Starting all");
    /// ```
    pub fn standard(wake_word: &str) -> Self {
        use RemoteAction::*;

        let wake = wake_word.trim().to_lowercase();
        let phrase = |rest: &str| {
            if wake.is_empty() {
                rest.to_string()
            } else {
                format!("{wake} {rest}")
            }
        };

        let clip = CommandEntry::new(
            [phrase("clip it"), phrase("clip that")],
            [SaveBuffer],
            "Clipping",
        );
        let entries = vec![
            CommandEntry::new([phrase("start recording")], [StartRecording], "Starting recording"),
            CommandEntry::new([phrase("stop recording")], [StopRecording], "Stopping recording"),
            CommandEntry::new([phrase("start the replay")], [StartBuffer], "Starting replay buffer"),
            CommandEntry::new([phrase("stop the replay")], [StopBuffer], "Stopping replay buffer"),
            CommandEntry::new(
                [phrase("start everything")],
                [StartRecording, StartBuffer],
                "Starting all",
            ),
            CommandEntry::new(
                [phrase("stop everything")],
                [StopRecording, StopBuffer],
                "Stopping all",
            ),
        ];

        Self::new(Some(clip), entries)
    }

    pub fn clip(&self) -> Option<&CommandEntry> {
        self.clip.as_ref()
    }

    pub fn entries(&self) -> &[CommandEntry] {
        &self.entries
    }

    /// Every trigger phrase, clip phrases first.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.clip
            .iter()
            .chain(&self.entries)
            .flat_map(|e| e.triggers.iter().map(String::as_str))
    }

    /// Recognizer prompt listing the phrases, so decoding favours the wake
    /// word and command vocabulary over similar-sounding words.
    pub fn vocabulary_prompt(&self) -> String {
        let mut prompt = self.phrases().collect::<Vec<_>>().join(". ");
        if !prompt.is_empty() {
            prompt.push('.');
        }
        prompt
    }

    /// Entries to run for `utterance`, in execution order.
    ///
    /// A clip match short-circuits everything else.  Otherwise every regular
    /// entry whose trigger is contained in the utterance is returned in table
    /// order; overlapping triggers all fire.
    pub fn lookup(&self, utterance: &str) -> Vec<&CommandEntry> {
        if let Some(clip) = self.clip.as_ref().filter(|c| c.matches(utterance)) {
            return vec![clip];
        }
        self.entries.iter().filter(|e| e.matches(utterance)).collect()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::standard("freya")
    }
}
