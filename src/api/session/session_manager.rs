use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use log::{info, warn};
use parking_lot::Mutex;

use super::connection_session::{CancelHandle, ConnectionSession, SessionId};
use crate::core::error::{DBResult, SessionError, SessionResult};
use crate::transaction::{TransactionManager, TransactionState};

pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// 会话信息，用于展示会话列表
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub autocommit: bool,
    pub transaction_state: TransactionState,
    pub create_time: SystemTime,
}

#[derive(Debug)]
struct SessionEntry {
    session: Arc<Mutex<ConnectionSession>>,
    cancel: CancelHandle,
}

pub struct SessionManager {
    sessions: DashMap<SessionId, SessionEntry>,
    transactions: Arc<TransactionManager>,
    next_id: AtomicU64,
    max_sessions: usize,
    default_autocommit: bool,
}

impl SessionManager {
    pub fn new(transactions: Arc<TransactionManager>, max_sessions: usize, default_autocommit: bool) -> Self {
        Self {
            sessions: DashMap::new(),
            transactions,
            next_id: AtomicU64::new(0),
            max_sessions,
            default_autocommit,
        }
    }

    /// Creates a new session
    pub fn create_session(&self) -> SessionResult<SessionId> {
        if self.sessions.len() >= self.max_sessions {
            warn!(
                "Failed to create session: maximum sessions ({}) exceeded",
                self.max_sessions
            );
            return Err(SessionError::MaxSessionsExceeded(self.max_sessions));
        }

        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = ConnectionSession::new(session_id, self.default_autocommit);
        let cancel = session.cancel_handle();
        self.sessions.insert(
            session_id,
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                cancel,
            },
        );

        info!("Created session ID: {}", session_id);
        Ok(session_id)
    }

    /// Finds an existing session
    pub fn get_session(&self, session_id: SessionId) -> SessionResult<Arc<Mutex<ConnectionSession>>> {
        self.sessions
            .get(&session_id)
            .map(|entry| Arc::clone(&entry.session))
            .ok_or(SessionError::SessionNotFound(session_id))
    }

    /// 取消会话
    ///
    /// 会话正在执行批次时只设置取消标志，由批次在下一个语句边界处理；
    /// 会话空闲时立即中止其打开的显式事务，没有打开的事务则请求被丢弃
    pub fn cancel(&self, session_id: SessionId) -> DBResult<()> {
        let entry = self
            .sessions
            .get(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?;
        entry.cancel.cancel();
        info!("Cancel requested for session ID: {}", session_id);

        if let Some(mut session) = entry.session.try_lock() {
            if session.take_cancel_request() {
                self.transactions
                    .abort_on_cancel(session.transaction_slot())?;
            }
        }
        Ok(())
    }

    /// 关闭会话
    ///
    /// 先设置取消标志让正在执行的批次在语句边界停下，再等待会话锁，
    /// 最后终结仍未结束的事务
    pub fn close_session(&self, session_id: SessionId) -> DBResult<()> {
        let (_, entry) = self
            .sessions
            .remove(&session_id)
            .ok_or(SessionError::SessionNotFound(session_id))?;
        entry.cancel.cancel();

        let mut session = entry.session.lock();
        session.mark_closed();
        if session.transaction_state() != TransactionState::NoTxn {
            info!(
                "Session ID: {} closed with transaction in state {}",
                session_id,
                session.transaction_state()
            );
        }
        self.transactions
            .finalize_on_disconnect(session.transaction_slot())?;

        info!("Closed session ID: {}", session_id);
        Ok(())
    }

    /// 关闭所有会话，返回关闭的数量
    pub fn close_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        let mut closed = 0;
        for session_id in ids {
            match self.close_session(session_id) {
                Ok(()) => closed += 1,
                Err(e) => warn!("Failed to close session ID {}: {}", session_id, e),
            }
        }
        closed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// 获取会话列表信息
    ///
    /// 正在执行批次的会话被锁住，其状态无法读取，不会出现在列表中
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .filter_map(|entry| {
                entry.session.try_lock().map(|session| SessionInfo {
                    session_id: session.id(),
                    autocommit: session.autocommit(),
                    transaction_state: session.transaction_state(),
                    create_time: session.created_at(),
                })
            })
            .collect();
        infos.sort_by_key(|info| info.session_id);
        infos
    }
}
