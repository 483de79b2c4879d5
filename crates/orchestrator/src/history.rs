//! Ordered conversation state.

use crate::model::{FunctionCall, FunctionResult, Part, Role, Turn};
use thiserror::Error;

/// Rejected history mutations. A rejected mutation leaves the history as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("call batch is empty")]
    EmptyBatch,

    #[error("call batch has {calls} calls but {results} results")]
    BatchMismatch { calls: usize, results: usize },

    #[error("result {index} answers '{found}' but call {index} is '{expected}'")]
    OutOfOrder {
        index: usize,
        expected: String,
        found: String,
    },

    /// Call and result parts only enter through [`History::append_call_batch`].
    #[error("function call and result parts must be appended as a batch")]
    ReservedPart,
}

/// Conversation history with at most one system turn.
///
/// The system turn is held apart from the conversation so that it logically
/// precedes every other turn no matter when it was set.
#[derive(Debug, Clone, Default)]
pub struct History {
    system: Option<Turn>,
    turns: Vec<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or replace the system turn.
    pub fn set_system(&mut self, text: impl Into<String>) {
        self.system = Some(Turn::system(text));
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::user(text));
    }

    /// Append a user turn made of text and image parts.
    pub fn append_user_parts(&mut self, parts: Vec<Part>) -> Result<(), HistoryError> {
        if parts.iter().any(Part::is_bookkeeping) {
            return Err(HistoryError::ReservedPart);
        }
        self.turns.push(Turn::from_parts(Role::User, parts));
        Ok(())
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::assistant(text));
    }

    /// Append an assistant turn of calls and the user turn answering it.
    ///
    /// `results[i]` must answer `calls[i]`; both turns are appended or neither.
    pub fn append_call_batch(
        &mut self,
        calls: Vec<FunctionCall>,
        results: Vec<FunctionResult>,
    ) -> Result<(), HistoryError> {
        if calls.is_empty() {
            return Err(HistoryError::EmptyBatch);
        }
        if calls.len() != results.len() {
            return Err(HistoryError::BatchMismatch {
                calls: calls.len(),
                results: results.len(),
            });
        }
        if let Some((index, (call, result))) = calls
            .iter()
            .zip(&results)
            .enumerate()
            .find(|(_, (call, result))| call.id != result.call_id)
        {
            return Err(HistoryError::OutOfOrder {
                index,
                expected: call.id.clone(),
                found: result.call_id.clone(),
            });
        }

        self.turns.push(Turn::call_batch(calls));
        self.turns.push(Turn::result_batch(results));
        Ok(())
    }

    /// Borrow an immutable view for an endpoint request.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            system: self.system.as_ref(),
            turns: &self.turns,
        }
    }

    /// Conversation turns, excluding the system turn.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system(&self) -> Option<&Turn> {
        self.system.as_ref()
    }

    /// Number of turns including the system turn.
    pub fn len(&self) -> usize {
        self.turns.len() + usize::from(self.system.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop conversation turns, keeping the system turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Remove every call turn answered by the turn right after it, together
    /// with that answer. Returns how many turns were removed.
    pub fn compact_resolved_calls(&mut self) -> usize {
        let before = self.turns.len();
        let mut kept = Vec::with_capacity(before);
        let mut turns = std::mem::take(&mut self.turns).into_iter().peekable();

        while let Some(turn) = turns.next() {
            if turn.is_call_bookkeeping() && turns.peek().is_some_and(|next| answers(&turn, next)) {
                turns.next();
                continue;
            }
            kept.push(turn);
        }

        self.turns = kept;
        before - self.turns.len()
    }
}

fn answers(calls: &Turn, results: &Turn) -> bool {
    if !results.is_result_bookkeeping() {
        return false;
    }
    let call_ids = calls.function_calls().into_iter().map(|c| c.id.as_str());
    let result_ids = results
        .function_results()
        .into_iter()
        .map(|r| r.call_id.as_str());
    call_ids.eq(result_ids)
}

/// Borrowed, ordered view of a [`History`].
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    system: Option<&'a Turn>,
    turns: &'a [Turn],
}

impl<'a> Snapshot<'a> {
    pub fn system(&self) -> Option<&'a Turn> {
        self.system
    }

    /// Conversation turns without the system turn.
    pub fn turns(&self) -> &'a [Turn] {
        self.turns
    }

    /// All turns, system first.
    pub fn iter(&self) -> impl Iterator<Item = &'a Turn> + 'a {
        self.system.into_iter().chain(self.turns.iter())
    }

    pub fn len(&self) -> usize {
        self.turns.len() + usize::from(self.system.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Arguments, ToolOutcome};
    use serde_json::json;

    fn call(id: &str) -> FunctionCall {
        FunctionCall::new(id, "get_weather", Arguments::new())
    }

    fn result(id: &str) -> FunctionResult {
        FunctionResult {
            call_id: id.into(),
            name: "get_weather".into(),
            outcome: ToolOutcome::success(json!(18)),
        }
    }

    #[test]
    fn set_system_twice_keeps_one_system_turn() {
        let mut history = History::new();
        history.append_user("hi");
        history.set_system("first");
        history.set_system("second");

        let snapshot = history.snapshot();
        let systems: Vec<_> = snapshot.iter().filter(|t| t.role == Role::System).collect();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].text(), "second");
        assert_eq!(snapshot.iter().next().unwrap().role, Role::System);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.turns().len(), 1);
    }

    #[test]
    fn call_batch_appends_pair_in_order() {
        let mut history = History::new();
        history.append_user("Weather in Paris and Rome?");
        history
            .append_call_batch(vec![call("a"), call("b")], vec![result("a"), result("b")])
            .unwrap();

        let turns = history.turns();
        assert_eq!(turns.len(), 3);
        assert!(turns[1].is_call_bookkeeping());
        assert_eq!(turns[1].role, Role::Assistant);
        assert!(turns[2].is_result_bookkeeping());
        let ids: Vec<_> = turns[2].function_results().iter().map(|r| r.call_id.clone()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn malformed_batches_are_rejected_without_mutation() {
        let mut history = History::new();
        assert_eq!(
            history.append_call_batch(vec![], vec![]),
            Err(HistoryError::EmptyBatch)
        );
        assert_eq!(
            history.append_call_batch(vec![call("a")], vec![]),
            Err(HistoryError::BatchMismatch {
                calls: 1,
                results: 0
            })
        );
        assert!(matches!(
            history.append_call_batch(vec![call("a"), call("b")], vec![result("b"), result("a")]),
            Err(HistoryError::OutOfOrder { index: 0, .. })
        ));
        assert!(history.is_empty());
    }

    #[test]
    fn user_parts_cannot_smuggle_bookkeeping() {
        let mut history = History::new();
        let err = history
            .append_user_parts(vec![Part::FunctionCall(call("a"))])
            .unwrap_err();
        assert_eq!(err, HistoryError::ReservedPart);

        history
            .append_user_parts(vec![Part::text("what is this?"), Part::image(vec![1, 2], "image/png")])
            .unwrap();
        assert_eq!(history.turns()[0].parts.len(), 2);
    }

    #[test]
    fn compaction_removes_every_resolved_pair() {
        let mut history = History::new();
        history.set_system("be brief");
        history.append_user("q1");
        history
            .append_call_batch(vec![call("a")], vec![result("a")])
            .unwrap();
        history.append_assistant("a1");
        history.append_user("q2");
        history
            .append_call_batch(vec![call("b"), call("c")], vec![result("b"), result("c")])
            .unwrap();
        history
            .append_call_batch(vec![call("d")], vec![result("d")])
            .unwrap();
        history.append_assistant("a2");

        assert_eq!(history.compact_resolved_calls(), 6);
        let texts: Vec<_> = history.turns().iter().map(Turn::text).collect();
        assert_eq!(texts, ["q1", "a1", "q2", "a2"]);
        assert!(history.system().is_some());
        assert_eq!(history.compact_resolved_calls(), 0);
    }

    #[test]
    fn clear_keeps_system() {
        let mut history = History::new();
        history.set_system("sys");
        history.append_user("hi");
        history.clear();
        assert_eq!(history.len(), 1);
        assert!(history.turns().is_empty());
    }
}
