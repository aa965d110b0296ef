use std::sync::Arc;

use domain::{Message, UserId};

use crate::{error::ApplicationError, repository::MessageRepository};

/// 两个身份之间的历史消息查询
pub struct HistoryService {
    messages: Arc<dyn MessageRepository>,
}

impl HistoryService {
    pub fn new(messages: Arc<dyn MessageRepository>) -> Self {
        Self { messages }
    }

    /// 调用者与 `peer` 之间的全部消息，按创建时间升序
    pub async fn conversation(
        &self,
        caller: UserId,
        peer: UserId,
    ) -> Result<Vec<Message>, ApplicationError> {
        Ok(self.messages.history(caller, peer).await?)
    }
}
