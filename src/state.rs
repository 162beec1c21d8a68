//! 전송 세션 상태 머신
//!
//! ```text
//! Idle → Negotiating → Active → Draining → Complete
//!          (송신측)       ↑          (수신측: Active → Complete)
//!                   Idle ─┘ (수신측: 메타데이터 도착)
//! 종료되지 않은 모든 상태 → Failed, 모든 상태 → Aborted
//! ```

use crate::{Error, Result};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Active,
    Draining,
    Complete,
    Failed,
    Aborted,
}

impl SessionState {
    /// 더 이상 패킷을 받지 않는 상태
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Aborted)
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if self == next {
            return !self.is_terminal() || self == Aborted;
        }

        match (self, next) {
            (Aborted, _) => false,
            (Failed, Aborted) => true,
            (Failed, _) => false,
            (_, Aborted) | (_, Failed) => true,
            (Idle, Negotiating) | (Idle, Active) => true,
            (Negotiating, Active) => true,
            (Active, Draining) | (Active, Complete) => true,
            (Draining, Complete) => true,
            // 같은 채널 셋으로 다음 전송 시작
            (Complete, Negotiating) | (Complete, Active) => true,
            _ => false,
        }
    }

    /// 검증된 전이
    pub fn transition(self, next: SessionState) -> Result<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidState {
                from: self,
                to: next,
            })
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}
