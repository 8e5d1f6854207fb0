// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#[cfg(test)]
pub mod log_tester {
    //! Captures log records emitted on the current thread, so tests can
    //! assert on the warning side channel.

    use log::{Level, LevelFilter, Metadata, Record};
    use std::cell::{Cell, RefCell};

    pub struct CapturedRecord {
        pub level: Level,
        pub message: String,
    }

    thread_local! {
        static ACTIVE: Cell<bool> = const { Cell::new(false) };
        static RECORDS: RefCell<Vec<CapturedRecord>> = const { RefCell::new(Vec::new()) };
    }

    /// Captures this thread's log records until dropped. Only one capture may
    /// be active per thread at a time.
    pub struct ThreadLocalLogger;

    impl ThreadLocalLogger {
        pub fn start() -> Self {
            // set_logger only succeeds the first time, but the error isn't a problem.
            let _ = log::set_logger(&LoggerImpl);
            log::set_max_level(LevelFilter::Trace);
            let old = ACTIVE.replace(true);
            assert!(!old);
            ThreadLocalLogger
        }

        fn take(self) -> Vec<CapturedRecord> {
            RECORDS.take()
        }

        /// Asserts that some warning containing the given fragment was
        /// emitted.
        #[track_caller]
        pub fn check_has_warning(self, fragment: &str) {
            let records = self.take();
            assert!(
                records
                    .iter()
                    .any(|r| r.level == Level::Warn && r.message.contains(fragment)),
                "no warning containing {fragment:?} among {:?}",
                records
                    .iter()
                    .map(|r| format!("{}: {}", r.level, r.message))
                    .collect::<Vec<_>>()
            );
        }

        /// Asserts that nothing was logged at the given level.
        #[track_caller]
        pub fn check_levels_empty(self, level: Level) {
            let records = self.take();
            let offending: Vec<&str> = records
                .iter()
                .filter(|r| r.level == level)
                .map(|r| r.message.as_str())
                .collect();
            assert!(offending.is_empty(), "unexpected records: {offending:?}");
        }
    }

    impl Drop for ThreadLocalLogger {
        fn drop(&mut self) {
            let old = ACTIVE.replace(false);
            assert!(old);
            RECORDS.with_borrow_mut(|records| records.clear());
        }
    }

    struct LoggerImpl;

    impl log::Log for LoggerImpl {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            ACTIVE.get()
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                RECORDS.with_borrow_mut(|records| {
                    records.push(CapturedRecord {
                        level: record.level(),
                        message: format!("{}", record.args()),
                    })
                });
            }
        }

        fn flush(&self) {}
    }
}
