use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 经过认证的身份：用户 ID + 显示名。
///
/// 由身份校验器产生，在一条连接的生命周期内不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }
}
