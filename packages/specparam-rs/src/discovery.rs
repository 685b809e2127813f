//! Locating eyes-open, artifact-cleaned recordings in a BIDS tree

use crate::participants::Participant;
use crate::types::Condition;
use serde::Serialize;
use std::path::{Path, PathBuf};

const EYES_OPEN_TAG: &str = "open";
const CLEANED_TAG: &str = "clean";
const RECORDING_EXTENSION: &str = ".set";

/// A subject/session pair and the recording found for it, if any
#[derive(Debug, Clone, Serialize)]
pub struct SessionJob {
    pub subject: String,
    pub session: String,
    pub condition: Condition,
    pub eeg_dir: PathBuf,
    pub recording: Option<PathBuf>,
}

/// `<root>/<subject>/<session>/eeg`
pub fn session_eeg_dir(root: &Path, subject: &str, session: &str) -> PathBuf {
    root.join(subject).join(session).join("eeg")
}

pub fn is_eyes_open_recording(file_name: &str) -> bool {
    file_name.contains(EYES_OPEN_TAG)
        && file_name.contains(CLEANED_TAG)
        && file_name.ends_with(RECORDING_EXTENSION)
}

/// Find the eyes-open cleaned recording in a session directory.
///
/// Candidates are sorted by name and the first is returned. A missing or
/// unreadable directory yields `None`.
pub fn find_eyes_open_recording(eeg_dir: &Path) -> Option<PathBuf> {
    let entries = match std::fs::read_dir(eeg_dir) {
        Ok(e) => e,
        Err(e) => {
            log::debug!("Cannot list {}: {}", eeg_dir.display(), e);
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter(|entry| is_eyes_open_recording(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    candidates.sort();

    if candidates.len() > 1 {
        log::debug!(
            "{} candidate recordings in {}, using {}",
            candidates.len(),
            eeg_dir.display(),
            candidates[0].display()
        );
    }
    candidates.into_iter().next()
}

/// Expand the participants table into one job per subject and session.
pub fn plan_sessions(root: &Path, participants: &[Participant]) -> Vec<SessionJob> {
    let mut jobs = Vec::with_capacity(participants.len() * 2);
    for participant in participants {
        for (session, condition) in participant.sessions() {
            let eeg_dir = session_eeg_dir(root, &participant.participant_id, session);
            let recording = find_eyes_open_recording(&eeg_dir);
            jobs.push(SessionJob {
                subject: participant.participant_id.clone(),
                session: session.to_string(),
                condition,
                eeg_dir,
                recording,
            });
        }
    }
    jobs
}
