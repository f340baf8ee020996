///
/// Transaction hooks.
///
/// A connection owns at most one commit, one rollback and one update hook.
/// `HookSlots` remembers what was installed so the same callbacks can be
/// put back on a fresh engine connection after a reconnect. Setting a slot
/// to `None` uninstalls the engine hook.
///
/// - Commit hook: returns `CommitDecision::Abort` to turn the commit into a
///   rollback.
/// - Rollback hook: notification only.
/// - Update hook: `(kind, database, table, rowid)` for every row change on a
///   rowid table.
///

use std::fmt;
use std::sync::Arc;

use rusqlite::hooks::Action;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    Proceed,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Insert,
    Update,
    Delete,
}

impl UpdateKind {
    pub fn from_action(action: Action) -> Option<Self> {
        match action {
            Action::SQLITE_INSERT => Some(UpdateKind::Insert),
            Action::SQLITE_UPDATE => Some(UpdateKind::Update),
            Action::SQLITE_DELETE => Some(UpdateKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Insert => "INSERT",
            UpdateKind::Update => "UPDATE",
            UpdateKind::Delete => "DELETE",
        }
    }

    /// Engine operation code (`SQLITE_INSERT` etc.).
    pub fn code(&self) -> i32 {
        match self {
            UpdateKind::Insert => rusqlite::ffi::SQLITE_INSERT,
            UpdateKind::Update => rusqlite::ffi::SQLITE_UPDATE,
            UpdateKind::Delete => rusqlite::ffi::SQLITE_DELETE,
        }
    }
}

pub type CommitHook = Arc<dyn Fn() -> CommitDecision + Send + Sync>;
pub type RollbackHook = Arc<dyn Fn() + Send + Sync>;
pub type UpdateHook = Arc<dyn Fn(UpdateKind, &str, &str, i64) + Send + Sync>;

#[derive(Clone, Default)]
pub struct HookSlots {
    commit: Option<CommitHook>,
    rollback: Option<RollbackHook>,
    update: Option<UpdateHook>,
}

impl HookSlots {
    pub fn set_commit(&mut self, hook: Option<CommitHook>) {
        self.commit = hook;
    }

    pub fn set_rollback(&mut self, hook: Option<RollbackHook>) {
        self.rollback = hook;
    }

    pub fn set_update(&mut self, hook: Option<UpdateHook>) {
        self.update = hook;
    }

    pub fn has_commit(&self) -> bool {
        self.commit.is_some()
    }

    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }

    pub fn has_update(&self) -> bool {
        self.update.is_some()
    }

    /// Installs every slot on `conn`, uninstalling the empty ones.
    pub fn apply(&self, conn: &Connection) {
        self.apply_commit(conn);
        self.apply_rollback(conn);
        self.apply_update(conn);
    }

    pub fn apply_commit(&self, conn: &Connection) {
        match &self.commit {
            Some(hook) => {
                let hook = hook.clone();
                // The engine rolls back when the hook returns true.
                conn.commit_hook(Some(move || hook() == CommitDecision::Abort));
            }
            None => {
                conn.commit_hook(None::<fn() -> bool>);
            }
        }
    }

    pub fn apply_rollback(&self, conn: &Connection) {
        match &self.rollback {
            Some(hook) => {
                let hook = hook.clone();
                conn.rollback_hook(Some(move || hook()));
            }
            None => {
                conn.rollback_hook(None::<fn()>);
            }
        }
    }

    pub fn apply_update(&self, conn: &Connection) {
        match &self.update {
            Some(hook) => {
                let hook = hook.clone();
                conn.update_hook(Some(
                    move |action: Action, db: &str, table: &str, rowid: i64| {
                        if let Some(kind) = UpdateKind::from_action(action) {
                            hook(kind, db, table, rowid);
                        }
                    },
                ));
            }
            None => {
                conn.update_hook(None::<fn(Action, &str, &str, i64)>);
            }
        }
    }
}

impl fmt::Debug for HookSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSlots")
            .field("commit", &self.has_commit())
            .field("rollback", &self.has_rollback())
            .field("update", &self.has_update())
            .finish()
    }
}
