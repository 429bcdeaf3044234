/*! try/catch/finally over closures.

Only the body is supervised.  Whatever the handler or the finalizer raise goes to the caller.
*/

use std::fmt;
#[cfg(any(test, not(catchr_objc)))]
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::Exception;

#[cfg(catchr_objc)]
use crate::objc::supervise;

///Runs `f`, catching any panic.
#[cfg(not(catchr_objc))]
#[inline(always)]
fn supervise<F, R>(f: F) -> Result<R, Exception> where F: FnOnce() -> R {
    catch_unwind(AssertUnwindSafe(f)).map_err(Exception::from_panic)
}

/**
Runs `body`, returning what it returned, or the [Exception] it raised.

This is the right tool when you need a return value; [try_catch_finally] is the block-shaped version.

```
use catchr::catch_exception;
assert_eq!(catch_exception(|| 2 + 2).unwrap(), 4);

let v: Vec<u8> = Vec::new();
let e = catch_exception(|| v[3]).unwrap_err();
assert!(e.message().unwrap().contains("index out of bounds"));
```

The closure may borrow from the stack, and need not be [std::panic::UnwindSafe].  If it panics halfway through
mutating something you can still see, you get to observe that half-done state.  That's what you asked for.
*/
pub fn catch_exception<F, R>(body: F) -> Result<R, Exception> where F: FnOnce() -> R {
    supervise(body)
}

/**
Classic try/catch/finally.

1.  If `body` is present, run it.
2.  If it raised, pass the [Exception] to `on_exception`.  If there is no `on_exception`, the exception is dropped
    on the floor: it never reaches your caller.  There is a `log::debug!`, and the panic hook has already had its say.
3.  Run `always`, exactly once, as the last thing we do.

Exceptions raised by `on_exception` or `always` are not caught.  If `on_exception` raises, `always` still runs and then
the handler's exception continues to the caller.  If `always` raises too, you see the one from `always`,
and the handler's exception is dropped.

```
use catchr::{try_catch_finally, Exception};
let mut caught = None;
let mut cleaned_up = false;
try_catch_finally(
    Some(|| panic!("nope")),
    Some(|e: Exception| caught = e.message().map(|m| m.into_owned())),
    Some(|| cleaned_up = true),
);
assert_eq!(caught.as_deref(), Some("nope"));
assert!(cleaned_up);
```

Leaving out a closure requires a type hint, e.g. `None::<fn()>` or `None::<fn(Exception)>`.  [ExceptionCatcher]
spares you that.

# Limitations
* With `panic = "abort"` there is nothing to catch.
* The panic hook still runs for a panicking body, so by default you'll see the message on stderr.
*/
pub fn try_catch_finally<B, C, A>(body: Option<B>, on_exception: Option<C>, always: Option<A>)
where
    B: FnOnce(),
    C: FnOnce(Exception),
    A: FnOnce(),
{
    let handled = match body.map(supervise) {
        Some(Err(exception)) => handle(exception, on_exception),
        Some(Ok(())) | None => Ok(()),
    };
    if let Some(always) = always {
        always();
    }
    //held as a value while `always` ran, so a panicking finalizer can't double-panic
    if let Err(exception) = handled {
        exception.resume()
    }
}

fn handle<C>(exception: Exception, on_exception: Option<C>) -> Result<(), Exception> where C: FnOnce(Exception) {
    match on_exception {
        Some(on_exception) => {
            log::trace!("catchr: forwarding {} to handler", exception);
            supervise(move || on_exception(exception))
        }
        None => {
            log::debug!("catchr: suppressing {} (no handler)", exception);
            Ok(())
        }
    }
}

/**
A [try_catch_finally] you fill in by name.  Every part is optional.

```
use catchr::ExceptionCatcher;
let mut log = Vec::new();
ExceptionCatcher::new()
    .try_(|| panic!("bad row"))
    .catch(|e| log.push(e.to_string()))
    .run();
assert_eq!(log, vec!["panic: bad row".to_string()]);
```

Setting a part twice replaces the earlier closure.
*/
pub struct ExceptionCatcher<B = fn(), C = fn(Exception), A = fn()> {
    body: Option<B>,
    on_exception: Option<C>,
    always: Option<A>,
}

impl ExceptionCatcher {
    ///A catcher that does nothing.
    pub fn new() -> Self {
        ExceptionCatcher { body: None, on_exception: None, always: None }
    }
}

impl Default for ExceptionCatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl<B, C, A> ExceptionCatcher<B, C, A> {
    ///The supervised body.
    pub fn try_<F>(self, body: F) -> ExceptionCatcher<F, C, A> where F: FnOnce() {
        ExceptionCatcher { body: Some(body), on_exception: self.on_exception, always: self.always }
    }
    ///Receives whatever the body raised.
    pub fn catch<F>(self, on_exception: F) -> ExceptionCatcher<B, F, A> where F: FnOnce(Exception) {
        ExceptionCatcher { body: self.body, on_exception: Some(on_exception), always: self.always }
    }
    ///Runs last, no matter what.
    pub fn finally<F>(self, always: F) -> ExceptionCatcher<B, C, F> where F: FnOnce() {
        ExceptionCatcher { body: self.body, on_exception: self.on_exception, always: Some(always) }
    }
}

impl<B, C, A> ExceptionCatcher<B, C, A> where B: FnOnce(), C: FnOnce(Exception), A: FnOnce() {
    ///Runs it.  See [try_catch_finally].
    pub fn run(self) {
        try_catch_finally(self.body, self.on_exception, self.always)
    }
}

impl<B, C, A> fmt::Debug for ExceptionCatcher<B, C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionCatcher")
            .field("try", &self.body.is_some())
            .field("catch", &self.on_exception.is_some())
            .field("finally", &self.always.is_some())
            .finish()
    }
}

#[cfg(test)]
use std::cell::{Cell, RefCell};

#[cfg(test)]
#[derive(Debug, PartialEq, Clone, Copy)]
struct Marker(u8);

///Remembers every record, and hands it on to env_logger.
#[cfg(test)]
struct RecordingLogger {
    inner: env_logger::Logger,
    records: std::sync::Mutex<Vec<(std::thread::ThreadId, log::Level, String)>>,
}

#[cfg(test)]
impl log::Log for RecordingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }
    fn log(&self, record: &log::Record) {
        if record.target().starts_with("catchr") {
            if let Ok(mut records) = self.records.lock() {
                records.push((std::thread::current().id(), record.level(), record.args().to_string()));
            }
        }
        if self.inner.matches(record) {
            self.inner.log(record)
        }
    }
    fn flush(&self) {
        self.inner.flush()
    }
}

#[cfg(test)]
impl RecordingLogger {
    ///Installs the logger (once per process) and returns it.
    fn install() -> &'static RecordingLogger {
        static LOGGER: std::sync::OnceLock<RecordingLogger> = std::sync::OnceLock::new();
        let logger = LOGGER.get_or_init(|| RecordingLogger {
            inner: env_logger::builder().is_test(true).build(),
            records: std::sync::Mutex::new(Vec::new()),
        });
        let _ = log::set_logger(logger);
        log::set_max_level(log::LevelFilter::Trace);
        logger
    }
    fn mark(&self) -> usize {
        self.records.lock().unwrap().len()
    }
    ///Records logged on this thread since `mark`.  Tests run in parallel, so we filter by thread.
    fn since(&self, mark: usize) -> Vec<(log::Level, String)> {
        let me = std::thread::current().id();
        self.records.lock().unwrap()[mark..]
            .iter()
            .filter(|(thread, _, _)| *thread == me)
            .map(|(_, level, message)| (*level, message.clone()))
            .collect()
    }
}

#[test] fn body_ok_runs_always_once() {
    let always = Cell::new(0);
    let handler = Cell::new(0);
    let ran = Cell::new(false);
    try_catch_finally(
        Some(|| ran.set(true)),
        Some(|_e: Exception| handler.set(handler.get() + 1)),
        Some(|| always.set(always.get() + 1)),
    );
    assert!(ran.get());
    assert_eq!(always.get(), 1);
    assert_eq!(handler.get(), 0);
}

#[test] fn body_raises_handler_then_always() {
    let order = RefCell::new(Vec::new());
    try_catch_finally(
        Some(|| std::panic::panic_any(Marker(7))),
        Some(|e: Exception| {
            assert_eq!(e.downcast_ref::<Marker>(), Some(&Marker(7)));
            order.borrow_mut().push("catch");
        }),
        Some(|| order.borrow_mut().push("finally")),
    );
    assert_eq!(*order.borrow(), vec!["catch", "finally"]);
}

#[test] fn body_raises_no_handler_is_suppressed() {
    let always = Cell::new(0);
    let r = catch_unwind(AssertUnwindSafe(|| {
        try_catch_finally(Some(|| panic!("swallowed")), None::<fn(Exception)>, Some(|| always.set(always.get() + 1)));
    }));
    assert!(r.is_ok());
    assert_eq!(always.get(), 1);
}

#[test] fn always_raising_propagates() {
    //body fine
    let r = catch_unwind(|| {
        try_catch_finally(Some(|| ()), None::<fn(Exception)>, Some(|| panic!("finalizer")));
    });
    assert_eq!(*r.unwrap_err().downcast_ref::<&str>().unwrap(), "finalizer");

    //body raised and was handled
    let handled = Cell::new(false);
    let r = catch_unwind(AssertUnwindSafe(|| {
        try_catch_finally(Some(|| panic!("body")), Some(|_e: Exception| handled.set(true)), Some(|| panic!("finalizer")));
    }));
    assert!(handled.get());
    assert_eq!(*r.unwrap_err().downcast_ref::<&str>().unwrap(), "finalizer");
}

#[test] fn handler_raising_propagates_after_always() {
    let always = Cell::new(0);
    let r = catch_unwind(AssertUnwindSafe(|| {
        try_catch_finally(
            Some(|| panic!("body")),
            Some(|_e: Exception| std::panic::panic_any(Marker(2))),
            Some(|| always.set(always.get() + 1)),
        );
    }));
    assert_eq!(always.get(), 1);
    assert_eq!(r.unwrap_err().downcast_ref::<Marker>(), Some(&Marker(2)));
}

#[test] fn handler_and_always_raising_finalizer_wins() {
    let always = Cell::new(0);
    let r = catch_unwind(AssertUnwindSafe(|| {
        try_catch_finally(
            Some(|| panic!("body")),
            Some(|_e: Exception| std::panic::panic_any(Marker(2))),
            Some(|| {
                always.set(always.get() + 1);
                std::panic::panic_any(Marker(3))
            }),
        );
    }));
    assert_eq!(always.get(), 1);
    assert_eq!(r.unwrap_err().downcast_ref::<Marker>(), Some(&Marker(3)));
}

#[test] fn suppressed_exception_is_logged_at_debug() {
    let logger = RecordingLogger::install();
    let mark = logger.mark();
    try_catch_finally(Some(|| panic!("quiet")), None::<fn(Exception)>, Some(|| ()));
    let records = logger.since(mark);
    assert_eq!(records.len(), 1, "{:?}", records);
    assert_eq!(records[0].0, log::Level::Debug);
    assert!(records[0].1.contains("suppressing"), "{}", records[0].1);
    assert!(records[0].1.contains("panic: quiet"), "{}", records[0].1);
}

#[test] fn forwarded_exception_is_logged_at_trace() {
    let logger = RecordingLogger::install();
    let mark = logger.mark();
    let handled = Cell::new(false);
    try_catch_finally(Some(|| panic!("loud")), Some(|_e: Exception| handled.set(true)), Some(|| ()));
    assert!(handled.get());
    let records = logger.since(mark);
    assert_eq!(records.len(), 1, "{:?}", records);
    assert_eq!(records[0].0, log::Level::Trace);
    assert!(records[0].1.contains("forwarding"), "{}", records[0].1);
    assert!(records[0].1.contains("panic: loud"), "{}", records[0].1);
}

#[test] fn clean_body_logs_nothing() {
    let logger = RecordingLogger::install();
    let mark = logger.mark();
    try_catch_finally(Some(|| ()), Some(|_e: Exception| ()), None::<fn()>);
    assert!(logger.since(mark).is_empty());
}

#[test] fn scenario_no_op_body() {
    let c = Cell::new(0);
    try_catch_finally(Some(|| {}), None::<fn(Exception)>, Some(|| c.set(c.get() + 1)));
    assert_eq!(c.get(), 1);
}

#[test] fn scenario_handler_logs_exception() {
    let l = RefCell::new(Vec::new());
    let c = Cell::new(0);
    try_catch_finally(
        Some(|| std::panic::panic_any(Marker(1))),
        Some(|e: Exception| l.borrow_mut().push(*e.downcast_ref::<Marker>().unwrap())),
        Some(|| c.set(c.get() + 1)),
    );
    assert_eq!(*l.borrow(), vec![Marker(1)]);
    assert_eq!(c.get(), 1);
}

#[test] fn scenario_raise_without_handler() {
    let c = Cell::new(0);
    try_catch_finally(Some(|| std::panic::panic_any(Marker(1))), None::<fn(Exception)>, Some(|| c.set(c.get() + 1)));
    assert_eq!(c.get(), 1);
}

#[test] fn scenario_absent_body() {
    let c = Cell::new(0);
    try_catch_finally(None::<fn()>, None::<fn(Exception)>, Some(|| c.set(c.get() + 1)));
    assert_eq!(c.get(), 1);
}

#[test] fn nothing_at_all() {
    try_catch_finally(None::<fn()>, None::<fn(Exception)>, None::<fn()>);
    ExceptionCatcher::default().run();
}

#[test] fn catch_exception_result() {
    let mut counter = 0;
    let r = catch_exception(|| {
        counter += 1;
        counter * 10
    });
    assert_eq!(r.unwrap(), 10);

    let e = catch_exception(|| -> u8 { std::panic::panic_any(Marker(5)) }).unwrap_err();
    assert_eq!(e.downcast_ref::<Marker>(), Some(&Marker(5)));
}

#[test] fn catch_exception_with_question_mark() {
    fn parse(s: &str) -> Result<u8, Box<dyn std::error::Error>> {
        let n = catch_exception(|| s.parse::<u8>().expect("not a number"))?;
        Ok(n)
    }
    assert_eq!(parse("12").unwrap(), 12);
    let e = parse("twelve").unwrap_err();
    assert!(e.to_string().starts_with("panic: not a number"), "{}", e);
}

#[test] fn catcher_builder() {
    let log = RefCell::new(Vec::new());
    ExceptionCatcher::new()
        .finally(|| log.borrow_mut().push("finally".to_string()))
        .catch(|e| log.borrow_mut().push(e.to_string()))
        .try_(|| panic!("row 3"))
        .run();
    assert_eq!(*log.borrow(), vec!["panic: row 3".to_string(), "finally".to_string()]);
}

#[test] fn catcher_replaces_part() {
    let which = Cell::new(0);
    ExceptionCatcher::new()
        .finally(|| which.set(1))
        .finally(|| which.set(2))
        .run();
    assert_eq!(which.get(), 2);
}

#[test] fn catcher_debug() {
    let c = ExceptionCatcher::new().try_(|| ());
    assert_eq!(format!("{:?}", c), "ExceptionCatcher { try: true, catch: false, finally: false }");
}
