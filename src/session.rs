//! Session controller
//!
//! Owns the conversation log and the little transient state around it:
//! the unsent input, the selected dataset, the upload status line and the
//! single-flight flag for queries.
//!
//! Network work is split in two synchronous halves. `begin_*` validates and
//! applies the optimistic changes, handing back a ticket; `finish_*` takes the
//! ticket and the round-trip result. Outcomes are applied in ticket order, so
//! the log always follows the order in which the user acted even when an
//! upload and a query complete out of order.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;

use crate::analyst::{QueryReply, Transport};
use crate::dataset::DatasetFile;
use crate::error::{InputError, SessionError, TransportError};
use crate::store::{Message, MessageStore, NewMessage};

pub const GREETING: &str = "Hello! I am your Autonomous Data Analyst. Please upload a specific data file (CSV, Excel, JSON) to get started.";

/// Shown when a query fails without a usable backend detail
pub const FALLBACK_REPLY: &str = "Sorry, something went wrong.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    NeedsFile,
    Uploading,
    Uploaded(String),
    Failed,
}

impl UploadStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, UploadStatus::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Idle => Ok(()),
            UploadStatus::NeedsFile => f.write_str("Please select a file first."),
            UploadStatus::Uploading => f.write_str("Uploading..."),
            UploadStatus::Uploaded(name) => write!(f, "Uploaded: {name}"),
            UploadStatus::Failed => f.write_str("Upload failed."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ticket(u64);

/// Handed out by [`Session::submit_query`]; redeem it with [`Session::finish_query`].
#[derive(Debug)]
pub struct QueryTicket {
    ticket: Ticket,
    text: String,
}

impl QueryTicket {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Handed out by [`Session::begin_upload`]; redeem it with [`Session::finish_upload`].
#[derive(Debug)]
pub struct UploadTicket {
    ticket: Ticket,
    file: DatasetFile,
}

impl UploadTicket {
    pub fn file(&self) -> &DatasetFile {
        &self.file
    }
}

#[derive(Debug)]
enum Outcome {
    Reply(NewMessage),
    Uploaded(String),
    UploadFailed,
}

/// Text of the bot entry recorded for a failed query
pub fn failure_reply(err: &TransportError) -> String {
    match err.detail() {
        Some(detail) => format!("Error: {detail}"),
        None => FALLBACK_REPLY.to_string(),
    }
}

pub struct Session {
    store: MessageStore,
    pending_input: String,
    awaiting_reply: bool,
    active_file: Option<DatasetFile>,
    upload_status: UploadStatus,
    pending_uploads: usize,
    next_ticket: u64,
    in_flight: VecDeque<Ticket>,
    settled: BTreeMap<Ticket, Outcome>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let mut store = MessageStore::new();
        store.append(NewMessage::bot(GREETING, None));

        Self {
            store,
            pending_input: String::new(),
            awaiting_reply: false,
            active_file: None,
            upload_status: UploadStatus::Idle,
            pending_uploads: 0,
            next_ticket: 0,
            in_flight: VecDeque::new(),
            settled: BTreeMap::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.store.all()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.store.last()
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    pub fn pending_input_mut(&mut self) -> &mut String {
        &mut self.pending_input
    }

    pub fn awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn active_file(&self) -> Option<&DatasetFile> {
        self.active_file.as_ref()
    }

    /// Status line for uploads. Stays `Uploading` until the most recently
    /// started upload has an outcome.
    pub fn upload_status(&self) -> &UploadStatus {
        &self.upload_status
    }

    /// Operations begun but whose outcome has not been applied yet
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn uploading(&self) -> bool {
        self.upload_status == UploadStatus::Uploading
    }

    pub fn select_file(&mut self, file: DatasetFile) {
        tracing::info!(file = %file.name, "dataset selected");
        self.active_file = Some(file);
        self.upload_status = UploadStatus::Idle;
    }

    pub fn begin_upload(&mut self) -> Result<UploadTicket, SessionError> {
        // The selection is kept after upload so the same file can be sent again
        let Some(file) = self.active_file.clone() else {
            self.upload_status = UploadStatus::NeedsFile;
            return Err(InputError::NoFileSelected.into());
        };

        self.upload_status = UploadStatus::Uploading;
        self.pending_uploads += 1;
        Ok(UploadTicket {
            ticket: self.issue_ticket(),
            file,
        })
    }

    /// Record an upload result. Failures only reach the status line, never
    /// the conversation. The result is passed back for callers that report it.
    pub fn finish_upload(
        &mut self,
        ticket: UploadTicket,
        result: Result<(), TransportError>,
    ) -> Result<(), TransportError> {
        let outcome = match &result {
            Ok(()) => {
                tracing::info!(file = %ticket.file.name, "dataset uploaded");
                Outcome::Uploaded(ticket.file.name)
            }
            Err(e) => {
                tracing::warn!(file = %ticket.file.name, error = %e, "dataset upload failed");
                Outcome::UploadFailed
            }
        };
        self.settle(ticket.ticket, outcome);
        result
    }

    /// Starts a query unless the text is blank or another query is outstanding,
    /// in which case nothing happens and `None` is returned.
    pub fn submit_query(&mut self, text: &str) -> Option<QueryTicket> {
        if text.trim().is_empty() {
            return None;
        }
        if self.awaiting_reply {
            tracing::debug!("query ignored while a reply is pending");
            return None;
        }

        self.store.append(NewMessage::user(text));
        self.pending_input.clear();
        self.awaiting_reply = true;
        tracing::info!(chars = text.chars().count(), "query submitted");

        Some(QueryTicket {
            ticket: self.issue_ticket(),
            text: text.to_string(),
        })
    }

    pub fn submit_pending(&mut self) -> Option<QueryTicket> {
        let text = self.pending_input.clone();
        self.submit_query(&text)
    }

    pub fn finish_query(&mut self, ticket: QueryTicket, result: Result<QueryReply, TransportError>) {
        let reply = match result {
            Ok(reply) => {
                tracing::info!(has_chart = reply.plot.is_some(), "reply received");
                NewMessage::bot(reply.answer, reply.plot)
            }
            Err(e) => {
                tracing::warn!(error = %e, "query failed");
                NewMessage::bot(failure_reply(&e), None)
            }
        };
        self.settle(ticket.ticket, Outcome::Reply(reply));
    }

    /// Upload the active file and wait for the round trip.
    pub async fn upload(&mut self, transport: &dyn Transport) -> Result<(), SessionError> {
        let ticket = self.begin_upload()?;
        let result = guarded(transport.upload_dataset(ticket.file())).await;
        self.finish_upload(ticket, result)?;
        Ok(())
    }

    /// Submit `text` and wait for the reply. Returns `false` if the
    /// submission was ignored.
    pub async fn ask(&mut self, transport: &dyn Transport, text: &str) -> bool {
        let Some(ticket) = self.submit_query(text) else {
            return false;
        };
        let result = guarded(transport.submit_query(ticket.text())).await;
        self.finish_query(ticket, result);
        true
    }

    fn issue_ticket(&mut self) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight.push_back(ticket);
        ticket
    }

    fn settle(&mut self, ticket: Ticket, outcome: Outcome) {
        self.settled.insert(ticket, outcome);

        while let Some(front) = self.in_flight.front().copied() {
            let Some(outcome) = self.settled.remove(&front) else {
                break;
            };
            self.in_flight.pop_front();
            self.apply(outcome);
        }

        if self.settled.contains_key(&ticket) {
            tracing::debug!("outcome held until earlier operations finish");
        }
    }

    fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Reply(message) => {
                self.store.append(message);
                self.awaiting_reply = false;
            }
            Outcome::Uploaded(name) => {
                self.store.append(NewMessage::system(format!(
                    "System: Dataset \"{name}\" loaded successfully. I am now ready to analyze it."
                )));
                self.pending_uploads = self.pending_uploads.saturating_sub(1);
                if self.pending_uploads == 0 {
                    self.upload_status = UploadStatus::Uploaded(name);
                }
            }
            Outcome::UploadFailed => {
                self.pending_uploads = self.pending_uploads.saturating_sub(1);
                if self.pending_uploads == 0 {
                    self.upload_status = UploadStatus::Failed;
                }
            }
        }
    }
}

/// Turn a panic inside a round trip into an ordinary transport failure
async fn guarded<T, F>(fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(TransportError::Aborted("request panicked".to_string())))
}
