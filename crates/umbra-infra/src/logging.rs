// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logger bootstrap shared by binaries and integration tests.

use env_logger::{Builder, Env};

/// Installs `env_logger` with `RUST_LOG` honoured and `info` as the default
/// filter. Returns `false` if a logger was already installed, which is
/// harmless when several tests race to initialise logging.
pub fn init_logging() -> bool {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Like [`init_logging`], but captured by the test harness and defaulting to
/// `debug` for the renderer crates.
pub fn init_test_logging() -> bool {
    Builder::from_env(Env::default().default_filter_or("warn,umbra_core=debug,umbra_lanes=debug"))
        .is_test(true)
        .try_init()
        .is_ok()
}
