// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Slash-delimited, case-preserving path identifying a RunSpec or Group in
/// the tree, e.g. `/prod/web/api`. Always starts with `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AbsolutePathId(String);

impl AbsolutePathId {
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path = format!("/{path}");
        }
        if path.len() > 1 && path.ends_with('/') {
            path.pop();
        }
        Self(path)
    }

    pub fn root() -> Self {
        Self("/".to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The parent group path, or `None` if this is already the root.
    pub fn parent(&self) -> Option<AbsolutePathId> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(AbsolutePathId::root()),
            Some(idx) => Some(AbsolutePathId(self.0[..idx].to_owned())),
            None => None,
        }
    }

    /// True if `self` is `other` or nested under it.
    pub fn is_descendant_of(&self, other: &AbsolutePathId) -> bool {
        if other.is_root() {
            return true;
        }
        self.0 == other.0 || self.0.starts_with(&format!("{}/", other.0))
    }
}

impl fmt::Display for AbsolutePathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AbsolutePathId {
    fn from(s: &str) -> Self {
        AbsolutePathId::new(s)
    }
}

impl From<String> for AbsolutePathId {
    fn from(s: String) -> Self {
        AbsolutePathId::new(s)
    }
}

/// Stable identifier of an `Instance`, preserved across task restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(run_spec_id: &AbsolutePathId, uuid: uuid::Uuid) -> Self {
        InstanceId(format!("{}.instance-{}", encode_for_task_id(run_spec_id), uuid))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task id, embedding the instance id and an incarnation counter so that a
/// terminal status for an old incarnation is recognizably stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub instance_id: InstanceId,
    pub incarnation: u32,
    /// Only present for pods, which launch more than one task per instance.
    pub container_name: Option<String>,
}

impl TaskId {
    pub fn new(instance_id: InstanceId, incarnation: u32) -> Self {
        Self {
            instance_id,
            incarnation,
            container_name: None,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.container_name {
            Some(name) => write!(f, "{}.{}.{}", self.instance_id, name, self.incarnation),
            None => write!(f, "{}.{}", self.instance_id, self.incarnation),
        }
    }
}

fn encode_for_task_id(id: &AbsolutePathId) -> String {
    id.as_str().trim_start_matches('/').replace('/', "_")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn path_normalizes_leading_slash() {
        assert_eq!(AbsolutePathId::new("foo/bar").as_str(), "/foo/bar");
        assert_eq!(AbsolutePathId::new("/foo/bar").as_str(), "/foo/bar");
    }

    #[test]
    fn parent_of_root_is_none() {
        assert_eq!(AbsolutePathId::root().parent(), None);
    }

    #[test]
    fn parent_of_top_level_is_root() {
        assert_eq!(AbsolutePathId::new("/foo").parent(), Some(AbsolutePathId::root()));
    }

    #[test]
    fn descendant_check() {
        let parent = AbsolutePathId::new("/a/b");
        assert!(AbsolutePathId::new("/a/b/c").is_descendant_of(&parent));
        assert!(AbsolutePathId::new("/a/b").is_descendant_of(&parent));
        assert!(!AbsolutePathId::new("/a/bc").is_descendant_of(&parent));
    }
}
