use bon::Builder;
use stagehand_domain::event::Origin;
use stagehand_domain::identity::{ProductionId, UserId};

/// 会话上下文（Session Context）
///
/// 一个客户端会话的横切信息：所在制作与当前用户。
/// 用户标识用于识别推送通道上“本人变更的回声”。
///
/// ```rust
/// use stagehand_application::context::SessionContext;
///
/// let session = SessionContext::builder()
///     .production_id("prod-42")
///     .user_id("u-alice")
///     .user_name("Alice")
///     .build();
/// assert_eq!(session.production_id().as_str(), "prod-42");
/// assert_eq!(session.origin().user_name.as_deref(), Some("Alice"));
/// ```
#[derive(Builder, Clone, Debug, PartialEq)]
pub struct SessionContext {
    #[builder(into)]
    production_id: ProductionId,
    #[builder(into)]
    user_id: UserId,
    #[builder(into)]
    user_name: Option<String>,
}

impl SessionContext {
    pub fn production_id(&self) -> &ProductionId {
        &self.production_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    /// 作为事件发起者
    pub fn origin(&self) -> Origin {
        Origin {
            user_id: Some(self.user_id.clone()),
            user_name: self.user_name.clone(),
        }
    }
}
