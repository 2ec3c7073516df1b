/// Suspend the calling thread for the rest of the process lifetime.
///
/// Used after the module has taken over, when no module is configured, and
/// when the emulator transport never shows up.
pub fn park_forever() -> ! {
    tracing::debug!("Parking main thread");
    loop {
        // Spurious wakeups just park again.
        std::thread::park();
    }
}
