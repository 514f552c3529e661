//! Plain-text rendering of the client view.

use chrono::{DateTime, Utc};
use wave_types::{OperationState, SessionState, Submission, WaveView};

const TIME_FORMAT: &str = "%a %b %e %Y %H:%M:%S UTC";

pub fn progress(operation: OperationState) -> Option<&'static str> {
    match operation {
        OperationState::Idle => None,
        OperationState::Submitting => Some("processing your wave..."),
        OperationState::WaitingConfirmation => Some("mining, waiting for confirmation..."),
    }
}

fn time(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIME_FORMAT).to_string()
}

pub fn submission(submission: &Submission) -> String {
    format!(
        "Address: {}\nTime: {}\nMessage: {}",
        submission.sender,
        time(&submission.timestamp),
        submission.message
    )
}

pub fn header(view: &WaveView) -> String {
    let mut lines = Vec::new();
    match (&view.account, view.session) {
        (Some(account), SessionState::Connected) => lines.push(format!("Connected: {account}")),
        (_, SessionState::ConnectPending) => {
            lines.push("Waiting for the wallet to approve the connection...".to_owned())
        }
        _ => lines.push("Not connected.".to_owned()),
    }
    if view.connect_prompt {
        lines.push("Connect your wallet to wave: run `wave connect`.".to_owned());
    }
    lines.push(format!("Total Comfort Foods: {}", view.total_count));
    if let Some(text) = progress(view.operation) {
        lines.push(text.to_owned());
    }
    if let Some(error) = &view.error {
        lines.push(format!("error: {error}"));
    }
    lines.join("\n")
}

pub fn page(view: &WaveView) -> String {
    let mut out = header(view);
    for entry in &view.submissions {
        out.push_str("\n\n");
        out.push_str(&submission(entry));
    }
    out
}
