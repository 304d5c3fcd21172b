//! 对账引擎统一错误定义
//!
//! 覆盖校验、重复标签、版本冲突、网络/缺失、批量事务等调用方需要区分的失败，
//! 全部直接上报给调用方，核心不做静默重试。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 提交前校验 ---
    #[error("validation failed: missing required fields {missing:?}")]
    Validation { missing: Vec<&'static str> },

    // --- 服务端拒绝 ---
    #[error("duplicate display id: {display_id}")]
    DuplicateId { display_id: String },
    #[error(
        "version conflict on {stable_id}: client={client_version}, current={current_version}"
    )]
    Conflict {
        stable_id: String,
        current_version: u64,
        client_version: u64,
    },

    // --- 传输/缺失 ---
    #[error("network error: {reason}")]
    Network { reason: String },
    #[error("not found: {stable_id}")]
    NotFound { stable_id: String },
    /// 推送通道丢弃了消息，至少一次投递不再成立，需要重新拉取
    #[error("event channel lagged: {skipped} messages dropped")]
    Lagged { skipped: u64 },

    // --- 批量重排 ---
    #[error("reorder transaction failed: {failed} of {total} renames rejected ({reason})")]
    Transaction {
        total: usize,
        failed: usize,
        reason: String,
    },

    // --- 状态/取值 ---
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

impl DomainError {
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    pub fn not_found(stable_id: impl ToString) -> Self {
        Self::NotFound {
            stable_id: stable_id.to_string(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// 表单（模态框）是否必须保持打开，让用户修正输入后再提交
    pub fn blocks_dismissal(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::DuplicateId { .. } | Self::Conflict { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;
