use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

use crate::db::Database;
use crate::models::AppState;

pub const COLLECTION: &str = "nutricontrol";
pub const STATE_DOC_ID: &str = "main_state";

/// Storage for the household document.
///
/// Reads are snapshot subscriptions: a subscriber gets the current document
/// immediately and a full new snapshot after every write. Writes replace the
/// whole document; there is no merge, so the last writer wins.
pub trait StateStore: Send + Sync {
    /// Current document, or the empty initial state if none was ever written.
    fn load(&self) -> Result<AppState>;
    fn save(&self, state: &AppState) -> Result<()>;
    fn subscribe(&self) -> Receiver<AppState>;
}

pub struct SqliteStateStore {
    db: Mutex<Database>,
    subscribers: Mutex<Vec<Sender<AppState>>>,
}

impl SqliteStateStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn broadcast(&self, state: &AppState) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(state.clone()).is_ok());
    }
}

impl StateStore for SqliteStateStore {
    fn load(&self) -> Result<AppState> {
        let body = {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            db.get_document(COLLECTION, STATE_DOC_ID)?
        };
        match body {
            Some(body) => {
                serde_json::from_str(&body).context("stored household document is malformed")
            }
            None => Ok(AppState::default()),
        }
    }

    fn save(&self, state: &AppState) -> Result<()> {
        let body = serde_json::to_string(state).context("failed to serialize household state")?;
        {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            db.put_document(COLLECTION, STATE_DOC_ID, &body)?;
        }
        tracing::debug!(bytes = body.len(), "household document replaced");
        self.broadcast(state);
        Ok(())
    }

    fn subscribe(&self) -> Receiver<AppState> {
        let (tx, rx) = mpsc::channel();
        match self.load() {
            Ok(initial) => {
                // The receiver is still in scope, so this send cannot fail.
                let _ = tx.send(initial);
            }
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "no initial snapshot for subscriber");
            }
        }
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExerciseLog, WaterLog};
    use chrono::NaiveDate;

    fn sample_state() -> AppState {
        AppState {
            water_logs: vec![WaterLog {
                user_id: "Thiago".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                amount_ml: 500,
            }],
            ..AppState::default()
        }
    }

    #[test]
    fn test_load_without_document_is_empty_state() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        assert_eq!(store.load().unwrap(), AppState::default());
    }

    #[test]
    fn test_save_then_load() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store.save(&sample_state()).unwrap();
        assert_eq!(store.load().unwrap(), sample_state());
    }

    #[test]
    fn test_save_is_full_replace() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        store.save(&sample_state()).unwrap();

        let other = AppState {
            exercise_logs: vec![ExerciseLog {
                user_id: "Marcela".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 1, 6).unwrap(),
                completed: true,
            }],
            ..AppState::default()
        };
        store.save(&other).unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.water_logs.is_empty());
        assert_eq!(loaded.exercise_logs.len(), 1);
    }

    #[test]
    fn test_subscriber_gets_initial_and_pushed_snapshots() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let rx = store.subscribe();
        assert_eq!(rx.try_recv().unwrap(), AppState::default());
        assert!(rx.try_recv().is_err());

        store.save(&sample_state()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), sample_state());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let store = SqliteStateStore::open_in_memory().unwrap();
        let kept = store.subscribe();
        drop(store.subscribe());
        store.save(&sample_state()).unwrap();
        assert_eq!(store.subscribers.lock().unwrap().len(), 1);
        assert_eq!(kept.try_iter().last().unwrap(), sample_state());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.put_document(COLLECTION, STATE_DOC_ID, "not json").unwrap();
        let store = SqliteStateStore::new(db);
        assert!(store.load().is_err());
        // Subscribing still works, just without an initial snapshot
        let rx = store.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_legacy_document_loads() {
        let legacy = r#"{
            "meals": [{
                "id": "k3j2h1g0f",
                "userId": "Marcela",
                "weekNumber": 1,
                "dayOfWeek": 2,
                "time": "07:00",
                "food": "Pão com ovo",
                "amount": "2 fatias",
                "calories": 320,
                "consumed": false
            }],
            "weightLogs": [{"userId": "Marcela", "date": "2026-01-07", "weight": 61.2}],
            "waterLogs": [],
            "exerciseLogs": [],
            "shoppingLists": []
        }"#;
        let db = Database::open_in_memory().unwrap();
        db.put_document(COLLECTION, STATE_DOC_ID, legacy).unwrap();
        let store = SqliteStateStore::new(db);

        let state = store.load().unwrap();
        assert_eq!(state.meals.len(), 1);
        assert_eq!(state.meals[0].category.label(), "Café da Manhã");
        assert_eq!(state.weight_logs[0].weight, 61.2);
    }
}
