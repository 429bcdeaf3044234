// SPDX-License-Identifier: MIT OR Apache-2.0
/*!
# Drew's Rust library for try/catch/finally.

Sometimes you are handed a closure you don't trust: some user-supplied conversion that runs while you render a table row,
say.  If it blows up, you'd rather show an empty cell than take the whole process down.  This crate runs a closure under
supervision, hands whatever it raised to a handler, and then runs a finalizer exactly once, no matter what.

This crate is part of the [objr expanded universe universe](https://github.com/drewcrawford/objr#objr-expanded-universe) which provide low-level, zero-cost abstractions
for Apple platform features that mimic code from first-party compilers.  Distinctive features of this library include:

* Three ways in, one implementation:
    * [try_catch_finally], three optional closures, mirroring the classic `+[NSExceptionCatcher try:catch:finally:]` shape
    * [ExceptionCatcher], the same thing with named parts so you don't have to spell `None::<fn()>`
    * [catch_exception], a `Result`-returning version for when you need a return value
* Closures are non-escaping: they can borrow from your stack, and need not be `'static`, [Send] or [std::panic::UnwindSafe].
* Only the body is supervised.  If your handler or your finalizer raise, you hear about it.
* The `objc` feature (off by default) also catches objc exceptions (`NSException` and anything else you can `@throw`)
  on Apple targets.  Without it, a Rust panic is the only thing we catch.

# Examples

```
use catchr::ExceptionCatcher;
let mut rendered = String::new();
let mut rows_done = 0;
ExceptionCatcher::new()
    .try_(|| {
        let cells: Vec<&str> = Vec::new();
        rendered.push_str(cells[0]);
    })
    .catch(|e| eprintln!("couldn't render row: {}", e))
    .finally(|| rows_done += 1)
    .run();
assert_eq!(rows_done, 1);
```

## What "suppressed" means

Without a handler, an exception raised by the body is swallowed: it never reaches your caller, and you can't get it back.
That is not the same as silent.  A panicking body still runs the process-wide panic hook first, and the default hook
prints the message to stderr.  We leave the hook alone, since it belongs to the whole process and not to one call.
If you need the output gone, install your own hook with [std::panic::set_hook].

## Logging

We use the [log](https://crates.io/crates/log) facade.  A swallowed exception (no handler) is reported at `debug`, a forwarded
one at `trace`.  No logger, no output.
*/
mod exception;
mod catcher;

#[cfg(catchr_objc)]
mod objc;

pub use exception::Exception;
pub use catcher::{catch_exception, try_catch_finally, ExceptionCatcher};
