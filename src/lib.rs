//! Backend core for a personal webmail dashboard: imports a bounded window of a
//! user's Gmail messages (inbox and sent) into a local SQLite store.
//!
//! The interesting part lives in [`sync`]: a paginated, deduplicating import
//! loop that caps the number of newly persisted messages per run. [`gmail`]
//! talks to the Gmail REST API behind the [`gmail::MailSource`] seam, and
//! [`db`] owns the relational schema the dashboard reads from.

pub mod db;
pub mod gmail;
pub mod sync;
