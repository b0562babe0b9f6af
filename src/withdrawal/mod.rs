//! Withdrawal Processing
//!
//! # Flow
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     WITHDRAWAL FLOW                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  1. Client requests a payout                                 │
//! │     └── currency, amount, destination address                │
//! │                                                              │
//! │  2. Service validates and quotes                             │
//! │     └── address syntax, registry row, minimum, point cost    │
//! │                                                              │
//! │  3. Points debited, record opened as `processing`            │
//! │                                                              │
//! │  4. Payout submitted to the provider                         │
//! │     └── ok: `completed` + transaction id                     │
//! │     └── rejected: `failed` + refund                          │
//! │     └── ambiguous: `failed`, held for manual review          │
//! │                                                              │
//! │  5. Client polls the tracker until confirmed                 │
//! │                                                              │
//! │  6. Reconciler fails records stuck in `processing`           │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod reconciler;
pub mod service;
pub mod tracker;

pub use error::WithdrawalError;
pub use reconciler::{Reconciler, STALE_MESSAGE};
pub use service::{NewWithdrawal, WithdrawalReceipt, WithdrawalService};
pub use tracker::{ConfirmationTracker, TrackResult};
