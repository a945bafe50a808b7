//! Optimistic status moves on the lead board.
//!
//! Placement and counters change before the backend is asked. When the
//! backend refuses, exactly the recorded change is undone: the card goes
//! back to its original column and position and both counters return to
//! their prior values. A move whose request is dropped before it settles
//! is undone the same way.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use leadflow_backend::{BackendError, LeadBackend};
use leadflow_types::{KanbanStatus, LeadId};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub id: LeadId,
    pub title: String,
    pub status: KanbanStatus,
}

impl Card {
    #[must_use]
    pub fn new(id: LeadId, title: impl Into<String>, status: KanbanStatus) -> Self {
        Self {
            id,
            title: title.into(),
            status,
        }
    }
}

/// Presentation-facing notices, delivered in order of occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardNotice {
    Moved { card: LeadId, to: KanbanStatus },
    /// The card reached the conversion column.
    Celebrate { card: LeadId },
    MoveFailed {
        card: LeadId,
        from: KanbanStatus,
        to: KanbanStatus,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// Source and destination are the same column.
    NoOp,
}

#[derive(Debug, Error)]
pub enum KanbanError {
    #[error("card {0} is not on the board")]
    UnknownCard(LeadId),
    #[error("card {card} is in {actual}, not {expected}")]
    WrongColumn {
        card: LeadId,
        expected: KanbanStatus,
        actual: KanbanStatus,
    },
    #[error("card {0} already has a move in flight")]
    CardBusy(LeadId),
    #[error("moving card {card} failed: {source}")]
    Backend {
        card: LeadId,
        #[source]
        source: BackendError,
    },
}

#[derive(Default)]
struct Board {
    columns: BTreeMap<KanbanStatus, Vec<Card>>,
    counts: BTreeMap<KanbanStatus, u32>,
    busy: HashSet<LeadId>,
}

impl Board {
    fn locate(&self, id: &LeadId) -> Option<(KanbanStatus, usize)> {
        self.columns.iter().find_map(|(status, cards)| {
            cards
                .iter()
                .position(|card| card.id == *id)
                .map(|index| (*status, index))
        })
    }
}

/// What an optimistic move changed, so it can be undone.
struct AppliedMove {
    position: usize,
    /// 0 when the source counter was already 0.
    from_decrement: u32,
}

/// An applied move awaiting the backend. Reverted on drop unless confirmed.
struct PendingMove<'a> {
    controller: &'a KanbanStatusController,
    card: &'a LeadId,
    from: KanbanStatus,
    to: KanbanStatus,
    applied: Option<AppliedMove>,
}

impl PendingMove<'_> {
    fn confirm(mut self) {
        if self.applied.take().is_some() {
            self.controller.board().busy.remove(self.card);
        }
    }

    fn revert(mut self) {
        if let Some(applied) = self.applied.take() {
            self.controller
                .revert(self.card, self.from, self.to, &applied);
        }
    }
}

impl Drop for PendingMove<'_> {
    fn drop(&mut self) {
        let Some(applied) = self.applied.take() else {
            return;
        };
        self.controller
            .revert(self.card, self.from, self.to, &applied);
        tracing::warn!(card = %self.card, from = %self.from, to = %self.to, "Status update abandoned, move reverted");
        self.controller.notify(BoardNotice::MoveFailed {
            card: self.card.clone(),
            from: self.from,
            to: self.to,
            reason: "request cancelled".to_string(),
        });
    }
}

pub struct KanbanStatusController {
    backend: Arc<dyn LeadBackend>,
    board: Mutex<Board>,
    notices: mpsc::UnboundedSender<BoardNotice>,
}

impl KanbanStatusController {
    #[must_use]
    pub fn new(backend: Arc<dyn LeadBackend>) -> (Self, mpsc::UnboundedReceiver<BoardNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            backend,
            board: Mutex::new(Board::default()),
            notices: tx,
        };
        (controller, rx)
    }

    fn board(&self) -> MutexGuard<'_, Board> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the board contents. Counters start at the column sizes.
    pub fn load(&self, cards: impl IntoIterator<Item = Card>) {
        let mut board = self.board();
        board.columns.clear();
        board.counts.clear();
        for status in KanbanStatus::COLUMNS {
            board.columns.insert(status, Vec::new());
            board.counts.insert(status, 0);
        }
        for card in cards {
            *board.counts.entry(card.status).or_default() += 1;
            board.columns.entry(card.status).or_default().push(card);
        }
    }

    #[must_use]
    pub fn count(&self, status: KanbanStatus) -> u32 {
        self.board().counts.get(&status).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn column(&self, status: KanbanStatus) -> Vec<Card> {
        self.board().columns.get(&status).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn status_of(&self, card: &LeadId) -> Option<KanbanStatus> {
        self.board().locate(card).map(|(status, _)| status)
    }

    pub async fn move_card(
        &self,
        card: &LeadId,
        from: KanbanStatus,
        to: KanbanStatus,
    ) -> Result<MoveOutcome, KanbanError> {
        if from == to {
            return Ok(MoveOutcome::NoOp);
        }
        let pending = PendingMove {
            controller: self,
            card,
            from,
            to,
            applied: Some(self.apply(card, from, to)?),
        };
        tracing::debug!(card = %card, %from, %to, "Card moved optimistically");

        let result = self.backend.patch_status(card, to).await;

        match result {
            Ok(()) => {
                pending.confirm();
                self.notify(BoardNotice::Moved {
                    card: card.clone(),
                    to,
                });
                if to.is_conversion() {
                    self.notify(BoardNotice::Celebrate { card: card.clone() });
                }
                Ok(MoveOutcome::Moved)
            }
            Err(source) => {
                pending.revert();
                tracing::warn!(card = %card, %from, %to, "Status update failed, move reverted: {source}");
                self.notify(BoardNotice::MoveFailed {
                    card: card.clone(),
                    from,
                    to,
                    reason: source.detail(),
                });
                Err(KanbanError::Backend {
                    card: card.clone(),
                    source,
                })
            }
        }
    }

    fn apply(
        &self,
        id: &LeadId,
        from: KanbanStatus,
        to: KanbanStatus,
    ) -> Result<AppliedMove, KanbanError> {
        let mut board = self.board();
        if board.busy.contains(id) {
            return Err(KanbanError::CardBusy(id.clone()));
        }
        let (actual, position) = board
            .locate(id)
            .ok_or_else(|| KanbanError::UnknownCard(id.clone()))?;
        if actual != from {
            return Err(KanbanError::WrongColumn {
                card: id.clone(),
                expected: from,
                actual,
            });
        }

        let mut card = board
            .columns
            .get_mut(&from)
            .map(|cards| cards.remove(position))
            .ok_or_else(|| KanbanError::UnknownCard(id.clone()))?;
        card.status = to;
        board.columns.entry(to).or_default().push(card);

        let from_count = board.counts.entry(from).or_default();
        let from_decrement = u32::from(*from_count > 0);
        *from_count -= from_decrement;
        *board.counts.entry(to).or_default() += 1;

        board.busy.insert(id.clone());
        Ok(AppliedMove {
            position,
            from_decrement,
        })
    }

    fn revert(&self, id: &LeadId, from: KanbanStatus, to: KanbanStatus, applied: &AppliedMove) {
        let mut board = self.board();
        board.busy.remove(id);

        let card = board.columns.get_mut(&to).and_then(|cards| {
            let index = cards.iter().position(|card| card.id == *id)?;
            Some(cards.remove(index))
        });
        if let Some(mut card) = card {
            card.status = from;
            let cards = board.columns.entry(from).or_default();
            let position = applied.position.min(cards.len());
            cards.insert(position, card);
        }

        *board.counts.entry(from).or_default() += applied.from_decrement;
        let to_count = board.counts.entry(to).or_default();
        *to_count = to_count.saturating_sub(1);
    }

    fn notify(&self, notice: BoardNotice) {
        if self.notices.send(notice).is_err() {
            tracing::debug!("Board notice dropped; no listener");
        }
    }
}
