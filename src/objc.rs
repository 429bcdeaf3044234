/*! Catching objc exceptions.  Only built with the `objc` feature on apple targets.

The `@try` has to be written in objc, so it lives in `objc/exception.m` (compiled by build.rs).
We hand it a C function pointer and a context pointer, much like a block literal's invoke/closure pair.

Ordering matters here.  Rust's [std::panic::catch_unwind] is the *outer* frame and `@try` the inner one.
It can't be the other way around: `catch_unwind` meeting a foreign (objc) exception is allowed to abort the process,
and today it does.  So:

* an objc exception stops at `@catch (id)` and never reaches `catch_unwind`
* a Rust panic unwinds through `catchr_try` into `catch_unwind`.  `@catch (id)` is a typed handler, and the objc
  personality only matches typed handlers against objc exception objects, so a foreign exception like a Rust panic
  can't be caught there.  `catchr_try` has no `@finally` and owns nothing, so there is no cleanup to run in that frame either.
  Every Rust frame it crosses is `C-unwind`.
*/

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr::NonNull;

use crate::Exception;

extern "C-unwind" {
    ///Declared in objc/exception.m.  Returns the thrown object (+1) or null.
    fn catchr_try(call: extern "C-unwind" fn(*mut c_void), context: *mut c_void) -> *mut c_void;
    fn objc_exception_throw(exception: *mut c_void) -> !;
}

extern "C" {
    fn catchr_copy_reason(exception: *mut c_void) -> *mut c_char;
    fn catchr_copy_name(exception: *mut c_void) -> *mut c_char;
    fn objc_release(obj: *mut c_void);
    fn objc_autorelease(obj: *mut c_void) -> *mut c_void;
    fn free(ptr: *mut c_void);
}

struct Context<F, R> {
    body: Option<F>,
    result: Option<R>,
}

//ObjC exceptions may unwind through this frame, hence C-unwind.
extern "C-unwind" fn invoke_thunk<F, R>(context: *mut c_void) where F: FnOnce() -> R {
    let context: &mut Context<F, R> = unsafe { &mut *(context as *mut Context<F, R>) };
    if let Some(body) = context.body.take() {
        context.result = Some(body());
    }
}

///Runs `f`, catching both Rust panics and objc exceptions.
pub(crate) fn supervise<F, R>(f: F) -> Result<R, Exception> where F: FnOnce() -> R {
    let mut context = Context { body: Some(f), result: None };
    let context_ptr = &mut context as *mut Context<F, R> as *mut c_void;
    let thrown = catch_unwind(AssertUnwindSafe(|| unsafe {
        catchr_try(invoke_thunk::<F, R>, context_ptr)
    }))
    .map_err(Exception::from_panic)?;
    if let Some(thrown) = NonNull::new(thrown) {
        return Err(Exception::from_objc(ObjCException(thrown)));
    }
    match context.result {
        Some(result) => Ok(result),
        //catchr_try calls the thunk unconditionally; it returned nil, and the thunk didn't unwind
        None => unreachable!("catchr_try returned without running the body or throwing"),
    }
}

///Takes ownership of a malloc'd C string.
unsafe fn take_c_string(ptr: *mut c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let s = CStr::from_ptr(ptr).to_string_lossy().into_owned();
    free(ptr as *mut c_void);
    Some(s)
}

///A retained reference to a thrown objc object (usually an `NSException`).
pub(crate) struct ObjCException(NonNull<c_void>);

impl ObjCException {
    ///`-[NSException reason]`, or `-description` for non-NSException objects
    pub(crate) fn reason(&self) -> Option<String> {
        unsafe { take_c_string(catchr_copy_reason(self.0.as_ptr())) }
    }
    ///`-[NSException name]`, or the class name for non-NSException objects
    pub(crate) fn name(&self) -> Option<String> {
        unsafe { take_c_string(catchr_copy_name(self.0.as_ptr())) }
    }
    pub(crate) fn throw(self) -> ! {
        let ptr = self.0.as_ptr();
        //hand our +1 to the autoreleasepool, whoever catches this owns it from here
        std::mem::forget(self);
        unsafe {
            objc_exception_throw(objc_autorelease(ptr))
        }
    }
}

impl Drop for ObjCException {
    fn drop(&mut self) {
        unsafe { objc_release(self.0.as_ptr()) }
    }
}

#[cfg(test)]
extern "C-unwind" {
    fn catchr_raise(name: *const c_char, reason: *const c_char);
}

#[cfg(test)]
fn raise(name: &CStr, reason: &CStr) {
    unsafe { catchr_raise(name.as_ptr(), reason.as_ptr()) }
}

#[test] fn catches_nsexception() {
    let e = supervise(|| raise(c"CatchrTestException", c"it broke")).unwrap_err();
    assert!(e.is_objc());
    assert_eq!(e.message().as_deref(), Some("it broke"));
    assert_eq!(e.to_string(), "objc exception CatchrTestException: it broke");
    assert!(e.downcast_ref::<String>().is_none());
}

#[test] fn panics_pass_through_objc_frames() {
    let e = supervise(|| -> u8 { panic!("rust side") }).unwrap_err();
    assert!(!e.is_objc());
    assert_eq!(e.message().as_deref(), Some("rust side"));
}

#[cfg(test)]
#[derive(Debug, PartialEq)]
struct Marker(u8);

#[test] fn panic_crosses_objc_frame_intact() {
    struct Guard<'a>(&'a std::cell::Cell<bool>);
    impl Drop for Guard<'_> {
        fn drop(&mut self) { self.0.set(true) }
    }
    let dropped = std::cell::Cell::new(false);
    let e = supervise(|| {
        let _guard = Guard(&dropped);
        std::panic::panic_any(Marker(11))
    }).unwrap_err();
    //came back as a panic payload, not swallowed by @catch
    assert!(!e.is_objc());
    assert_eq!(e.downcast_ref::<Marker>(), Some(&Marker(11)));
    assert!(dropped.get());
}

#[test] fn trampoline_catches_objc_after_a_panic() {
    //a panic crossing the trampoline leaves it usable for objc exceptions
    let _ = supervise(|| panic!("first")).unwrap_err();
    let e = supervise(|| raise(c"After", c"still works")).unwrap_err();
    assert!(e.is_objc());
    assert_eq!(e.message().as_deref(), Some("still works"));
}

#[test] fn returns_value() {
    assert_eq!(supervise(|| 5u8).unwrap(), 5);
}

#[test] fn rethrow_is_caught_again() {
    let first = supervise(|| raise(c"Again", c"twice")).unwrap_err();
    let second = supervise(move || first.resume()).unwrap_err();
    assert!(second.is_objc());
    assert_eq!(second.message().as_deref(), Some("twice"));
}

#[test] fn bridge_forwards_nsexception() {
    let mut reason = None;
    let mut finalized = 0;
    crate::try_catch_finally(
        Some(|| raise(c"Bridge", c"handled")),
        Some(|e: Exception| reason = e.message().map(|m| m.into_owned())),
        Some(|| finalized += 1),
    );
    assert_eq!(reason.as_deref(), Some("handled"));
    assert_eq!(finalized, 1);
}
