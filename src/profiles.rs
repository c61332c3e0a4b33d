//! 用户档案 - 进程内存储 (进程退出即丢失)

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{json, Value};

pub const DEFAULT_USER: &str = "default_user";

#[derive(Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<String, Value>>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未保存过的用户返回空档案
    pub fn get(&self, user_id: &str) -> Value {
        self.profiles
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_else(empty_profile)
    }

    /// 整体替换档案
    pub fn put(&self, user_id: &str, profile: Value) {
        self.profiles.write().insert(user_id.to_string(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn empty_profile() -> Value {
    json!({ "beenThere": [], "wantToGo": [] })
}
