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

use std::time::{SystemTime, UNIX_EPOCH};

pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs()
}

pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}

/// Clamp a status message to `maxStatusMessageLength` (120 bytes), per the
/// observable constant in the specification. Truncates on a UTF-8 char
/// boundary so the result is always valid `str`.
pub fn clamp_status_message(message: &str, max_len: usize) -> String {
    if message.len() <= max_len {
        return message.to_owned();
    }

    let mut end = max_len;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_owned()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamp_respects_limit() {
        let long = "x".repeat(500);
        let clamped = clamp_status_message(&long, 120);
        assert_eq!(clamped.len(), 120);
    }

    #[test]
    fn clamp_is_noop_under_limit() {
        assert_eq!(clamp_status_message("short", 120), "short");
    }

    #[test]
    fn clamp_respects_char_boundaries() {
        let long = "é".repeat(200); // 2 bytes per char
        let clamped = clamp_status_message(&long, 121);
        assert!(clamped.len() <= 121);
        assert!(std::str::from_utf8(clamped.as_bytes()).is_ok());
    }
}
