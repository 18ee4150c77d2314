//! Accessibility trust checks for macOS
//!
//! A default (non listen-only) event tap needs the process to be trusted under
//! Privacy & Security > Accessibility.

use core_foundation::base::TCFType;
use core_foundation::boolean::CFBoolean;
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::string::{CFString, CFStringRef};

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn AXIsProcessTrustedWithOptions(options: CFDictionaryRef) -> bool;

    static kAXTrustedCheckOptionPrompt: CFStringRef;
}

/// Non-prompting trust check
pub fn is_trusted() -> bool {
    unsafe { AXIsProcessTrusted() }
}

/// Trust check that shows the system consent prompt when untrusted
///
/// The prompt is asynchronous; the return value is the status right now.
pub fn is_trusted_with_prompt() -> bool {
    let prompt_key = unsafe { CFString::wrap_under_get_rule(kAXTrustedCheckOptionPrompt) };
    let options = CFDictionary::from_CFType_pairs(&[(prompt_key, CFBoolean::true_value())]);

    unsafe { AXIsProcessTrustedWithOptions(options.as_concrete_TypeRef()) }
}
