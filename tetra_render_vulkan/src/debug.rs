/// Validation layer messages, routed through the tetra logger
///
/// The messenger itself only exists with the `vulkan-validation` feature.
/// Statistics and the report are always available so callers don't need
/// their own cfg gates; without the feature they simply stay at zero.

use ash::vk;
use colored::*;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use tetra_render::log::LogSeverity;

const SOURCE: &str = "tetra::vulkan::validation";

/// Counters of validation messages since the renderer was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct StatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl StatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn record(&self, severity: LogSeverity) {
        let counter = match severity {
            LogSeverity::Error => &self.errors,
            LogSeverity::Warn => &self.warnings,
            LogSeverity::Info => &self.info,
            LogSeverity::Debug | LogSeverity::Trace => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

static VALIDATION_STATS: StatsTracker = StatsTracker::new();

/// Occurrences per message id, for grouping repeats
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

fn track_message(message_id: &str) -> u32 {
    let mut guard = MESSAGE_TRACKER.lock().unwrap_or_else(PoisonError::into_inner);
    let count = guard.get_or_insert_with(FxHashMap::default).entry(message_id.to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Map a validation severity onto the logger's severities
pub fn severity_of(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
    if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogSeverity::Error
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogSeverity::Warn
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogSeverity::Debug
    } else {
        LogSeverity::Trace
    }
}

pub fn message_type_name(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if flags.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Count one message and forward it to the logger
pub fn report_message(severity: LogSeverity, type_name: &str, message_id: &str, message: &str) {
    VALIDATION_STATS.record(severity);
    let occurrences = track_message(message_id);
    let repeat = if occurrences > 1 { format!(" [x{}]", occurrences) } else { String::new() };

    let text = format!("[{}] {}{}: {}", type_name, message_id, repeat, message);
    match severity {
        LogSeverity::Error => tetra_render::render_error!(SOURCE, "{}", text),
        LogSeverity::Warn => tetra_render::render_warn!(SOURCE, "{}", text),
        LogSeverity::Info => tetra_render::render_info!(SOURCE, "{}", text),
        LogSeverity::Debug => tetra_render::render_debug!(SOURCE, "{}", text),
        LogSeverity::Trace => tetra_render::render_trace!(SOURCE, "{}", text),
    }
}

/// Clear counters and message groups (renderer creation)
pub fn reset_validation_stats() {
    VALIDATION_STATS.reset();
    *MESSAGE_TRACKER.lock().unwrap_or_else(PoisonError::into_inner) = None;
}

pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.snapshot()
}

/// Print the colored summary shown at renderer cleanup
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    let repeated = MESSAGE_TRACKER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map_or(0, |messages| messages.values().filter(|&&count| count > 1).count());
    if repeated > 0 {
        println!("\n  {} message(s) appeared multiple times", repeated);
    }
    println!("{}\n", "====================================".bright_blue().bold());
}

#[cfg(feature = "vulkan-validation")]
pub use messenger::*;

#[cfg(feature = "vulkan-validation")]
mod messenger {
    use super::*;
    use std::ffi::CStr;
    use tetra_render::Result;

    use crate::vulkan_convert::vk_init_err;

    pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

    /// Debug messenger callback
    ///
    /// # Safety
    /// Called by the Vulkan loader with a valid callback data pointer.
    pub unsafe extern "system" fn vulkan_debug_callback(
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT,
        p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
        _user_data: *mut std::os::raw::c_void,
    ) -> vk::Bool32 {
        if p_callback_data.is_null() {
            return vk::FALSE;
        }
        let callback_data = *p_callback_data;
        let message_id = if callback_data.p_message_id_name.is_null() {
            "Unknown"
        } else {
            CStr::from_ptr(callback_data.p_message_id_name).to_str().unwrap_or("Invalid UTF-8")
        };
        let message = if callback_data.p_message.is_null() {
            "No message"
        } else {
            CStr::from_ptr(callback_data.p_message).to_str().unwrap_or("Invalid UTF-8")
        };

        report_message(severity_of(message_severity), message_type_name(message_type), message_id, message);
        vk::FALSE
    }

    pub fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback))
    }

    /// Instance-level debug utils loader plus the installed messenger
    pub struct DebugMessenger {
        loader: ash::ext::debug_utils::Instance,
        messenger: vk::DebugUtilsMessengerEXT,
    }

    impl DebugMessenger {
        pub fn create(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
            reset_validation_stats();
            let loader = ash::ext::debug_utils::Instance::new(entry, instance);
            let messenger = unsafe {
                loader
                    .create_debug_utils_messenger(&messenger_create_info(), None)
                    .map_err(|e| vk_init_err(SOURCE, "Failed to create debug messenger", e))?
            };
            Ok(Self { loader, messenger })
        }

        pub fn destroy(&mut self) {
            if self.messenger != vk::DebugUtilsMessengerEXT::null() {
                unsafe { self.loader.destroy_debug_utils_messenger(self.messenger, None) };
                self.messenger = vk::DebugUtilsMessengerEXT::null();
            }
        }
    }
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
