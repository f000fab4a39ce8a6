use std::fmt;

/// Hook to receive a message before every request sent to the registry.
///
/// Messages look like `registry.manifest.get url=... repository=... reference=...`.
///
/// The hook is invoked synchronously, in the thread that sends the request,
/// so it should return quickly.
pub trait Logger: Send + Sync + 'static {
    fn logf(&self, args: fmt::Arguments<'_>);
}

/// [`Logger`] instance to discard all messages.
#[derive(Copy, Clone, Debug, Default)]
pub struct Quiet;

impl Logger for Quiet {
    fn logf(&self, _: fmt::Arguments<'_>) {}
}

/// [`Logger`] instance to send messages to the [`log`] crate.
#[derive(Copy, Clone, Debug, Default)]
pub struct Log;

impl Logger for Log {
    fn logf(&self, args: fmt::Arguments<'_>) {
        log::info!(target: "oci_registry_client", "{args}");
    }
}

impl<F> Logger for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync + 'static,
{
    fn logf(&self, args: fmt::Arguments<'_>) {
        self(args)
    }
}

#[test]
fn closures_as_loggers() {
    use std::sync::{Arc, Mutex};

    let lines = Arc::new(Mutex::new(Vec::new()));
    let logger = {
        let lines = Arc::clone(&lines);
        move |args: fmt::Arguments<'_>| lines.lock().unwrap().push(args.to_string())
    };

    logger.logf(format_args!("registry.ping url={}", "http://x"));
    Quiet.logf(format_args!("ignored"));

    assert_eq!(*lines.lock().unwrap(), ["registry.ping url=http://x"]);
}
