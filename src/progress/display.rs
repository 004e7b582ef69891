//! Terminal rendering of [`ProgressEvent`]s.
//!
//! ```rust
//! use fastget::progress::{ProgressDisplay, ProgressEvent, StyleOptions};
//! use std::path::PathBuf;
//!
//! let display = ProgressDisplay::new(StyleOptions::hidden(), 1);
//! display.update(&ProgressEvent {
//!     destination: PathBuf::from("file.iso"),
//!     transferred: 512,
//!     total: Some(1024),
//!     active_chunks: 2,
//! });
//! display.finish_child(&PathBuf::from("file.iso"));
//! display.finish();
//! ```

use super::{ProgressEvent, StyleOptions};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Main bar counting finished files plus one bar per file in flight.
pub struct ProgressDisplay {
    multi: Arc<MultiProgress>,
    main: ProgressBar,
    style_options: StyleOptions,
    children: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl ProgressDisplay {
    /// Create a new progress display manager for `total_files` downloads.
    ///
    /// The main bar is only shown when there is more than one file.
    pub fn new(style_options: StyleOptions, total_files: usize) -> Self {
        let multi = match style_options.is_enabled() {
            true => Arc::new(MultiProgress::new()),
            false => Arc::new(MultiProgress::with_draw_target(ProgressDrawTarget::hidden())),
        };

        let main = if total_files > 1 {
            let main = multi.add(style_options.main().to_progress_bar(total_files as u64));
            main.tick();
            main
        } else {
            ProgressBar::hidden()
        };

        Self {
            multi,
            main,
            style_options,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn children(&self) -> MutexGuard<'_, HashMap<PathBuf, ProgressBar>> {
        match self.children.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Move the bar of the event's file, creating it on first sight.
    pub fn update(&self, event: &ProgressEvent) {
        let mut children = self.children();
        let bar = children
            .entry(event.destination.clone())
            .or_insert_with(|| {
                let name = event
                    .destination
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let bar = self
                    .multi
                    .add(self.style_options.child().to_progress_bar(0));
                bar.set_message(name);
                bar
            });
        if let Some(total) = event.total {
            bar.set_length(total);
        }
        bar.set_position(event.transferred);
    }

    /// Finish the bar of `destination` and count the file as done.
    pub fn finish_child(&self, destination: &Path) {
        if let Some(bar) = self.children().remove(destination) {
            if self.style_options.child().clear {
                bar.finish_and_clear();
            } else {
                bar.finish();
            }
        }
        self.main.inc(1);
    }

    /// Print a line above the bars.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.style_options.is_enabled() {
            let _ = self.multi.println(line);
        } else {
            eprintln!("{}", line.as_ref());
        }
    }

    /// Number of files finished so far.
    pub fn finished_files(&self) -> u64 {
        self.main.position()
    }

    /// Finish the progress display, clearing or keeping bars based on configuration.
    pub fn finish(&self) {
        for (_, bar) in self.children().drain() {
            bar.finish_and_clear();
        }
        if self.style_options.main().clear {
            self.main.finish_and_clear();
        } else {
            self.main.finish();
        }
    }
}
