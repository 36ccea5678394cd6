#![no_main]
use libfuzzer_sys::fuzz_target;

// Pin names come from the config file, command names from the host console.
fuzz_target!(|data: &str| {
    let _ = data.parse::<fwidth_hardware::AdcPin>();
    if let Ok(cmd) = data.parse::<fwidth_core::Command>() {
        assert_eq!(cmd.name().parse::<fwidth_core::Command>().ok(), Some(cmd));
    }
});
