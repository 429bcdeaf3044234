/*! The opaque value handed to exception handlers. */

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::panic::resume_unwind;

use thiserror::Error;

///Whatever was actually raised.
pub(crate) enum Repr {
    ///A Rust panic.  This is the payload [std::panic::catch_unwind] hands back.
    Panic(Box<dyn Any + Send>),
    ///Something `@throw`n by objc.
    #[cfg(catchr_objc)]
    ObjC(crate::objc::ObjCException),
}

/**
Something that was raised inside a supervised closure.

The catcher does not look inside this value, it just moves it into your handler.  You can:

* read a human-readable [Exception::message]
* inspect a custom panic payload with [Exception::downcast_ref] / [Exception::is]
* take the payload back out with [Exception::into_payload]
* re-raise it with [Exception::resume]

This type implements [std::error::Error], so the result of [crate::catch_exception] composes with `?`.

```
let e = catchr::catch_exception(|| panic!("boom")).unwrap_err();
assert_eq!(e.message().as_deref(), Some("boom"));
assert_eq!(e.to_string(), "panic: boom");
```
*/
#[derive(Error)]
#[error("{}", describe(.repr))]
pub struct Exception {
    repr: Repr,
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Some(*s)
    }
    else {
        payload.downcast_ref::<String>().map(|s| s.as_str())
    }
}

fn describe(repr: &Repr) -> String {
    match repr {
        Repr::Panic(payload) => match panic_message(payload.as_ref()) {
            Some(message) => format!("panic: {}", message),
            None => "panic with non-string payload".to_owned(),
        },
        #[cfg(catchr_objc)]
        Repr::ObjC(exception) => format!(
            "objc exception {}: {}",
            exception.name().as_deref().unwrap_or("<unnamed>"),
            exception.reason().as_deref().unwrap_or("<no reason>")
        ),
    }
}

impl Exception {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Exception { repr: Repr::Panic(payload) }
    }
    #[cfg(catchr_objc)]
    pub(crate) fn from_objc(exception: crate::objc::ObjCException) -> Self {
        Exception { repr: Repr::ObjC(exception) }
    }

    ///The panic message, if the payload was a `&str` or `String` (which is what `panic!` produces).
    ///
    /// For objc exceptions, this is `-[NSException reason]`.
    pub fn message(&self) -> Option<Cow<'_, str>> {
        match &self.repr {
            Repr::Panic(payload) => panic_message(payload.as_ref()).map(Cow::Borrowed),
            #[cfg(catchr_objc)]
            Repr::ObjC(exception) => exception.reason().map(Cow::Owned),
        }
    }

    ///Borrows the panic payload as `T`, typically something raised with [std::panic::panic_any].
    ///
    /// Always `None` for objc exceptions.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match &self.repr {
            Repr::Panic(payload) => payload.downcast_ref::<T>(),
            #[cfg(catchr_objc)]
            Repr::ObjC(_) => None,
        }
    }

    ///Whether the panic payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    ///Whether this was `@throw`n by objc rather than raised by a Rust panic.
    pub fn is_objc(&self) -> bool {
        match &self.repr {
            Repr::Panic(_) => false,
            #[cfg(catchr_objc)]
            Repr::ObjC(_) => true,
        }
    }

    ///Takes the raw panic payload.  If this is an objc exception, you get `self` back.
    pub fn into_payload(self) -> Result<Box<dyn Any + Send>, Exception> {
        match self.repr {
            Repr::Panic(payload) => Ok(payload),
            #[cfg(catchr_objc)]
            repr @ Repr::ObjC(_) => Err(Exception { repr }),
        }
    }

    ///Raises this exception again, as if it had never been caught.
    ///
    /// Panics resume unwinding with their original payload (the panic hook does not run a second time).
    /// objc exceptions are re-thrown with `objc_exception_throw`.
    pub fn resume(self) -> ! {
        match self.repr {
            Repr::Panic(payload) => resume_unwind(payload),
            #[cfg(catchr_objc)]
            Repr::ObjC(exception) => exception.throw(),
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("message", &self.message())
            .field("objc", &self.is_objc())
            .finish()
    }
}

#[cfg(test)]
#[derive(Debug, PartialEq)]
struct Marker(u8);

#[test] fn message_from_static_str() {
    let e = Exception::from_panic(Box::new("static"));
    assert_eq!(e.message().as_deref(), Some("static"));
    assert_eq!(e.to_string(), "panic: static");
    assert!(!e.is_objc());
}

#[test] fn message_from_string() {
    let e = Exception::from_panic(Box::new(format!("formatted {}", 3)));
    assert_eq!(e.message().as_deref(), Some("formatted 3"));
    assert!(e.is::<String>());
}

#[test] fn custom_payload() {
    let e = Exception::from_panic(Box::new(Marker(9)));
    assert_eq!(e.message(), None);
    assert_eq!(e.downcast_ref::<Marker>(), Some(&Marker(9)));
    assert!(!e.is::<String>());
    assert_eq!(e.to_string(), "panic with non-string payload");
    let payload = e.into_payload().unwrap();
    assert_eq!(payload.downcast_ref::<Marker>(), Some(&Marker(9)));
}

#[test] fn debug_shows_message() {
    let e = Exception::from_panic(Box::new("dbg"));
    let s = format!("{:?}", e);
    assert!(s.contains("dbg"), "{}", s);
}

#[test] fn resume_keeps_payload() {
    let e = Exception::from_panic(Box::new(Marker(4)));
    let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || e.resume()));
    let payload = r.unwrap_err();
    assert_eq!(payload.downcast_ref::<Marker>(), Some(&Marker(4)));
}

#[test] fn is_an_error() {
    fn takes_error(_e: &dyn std::error::Error) {}
    takes_error(&Exception::from_panic(Box::new("e")));
}
