//! Classes packed into the archives used by the archload integration tests.

use archload_abi::{export_classes, string_function_vtable, Class, StringTransform, STRING_FUNCTION};
use std::ffi::{c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

fn string_function<T: Class + StringTransform>(interface: &CStr) -> *const c_void {
    if interface == STRING_FUNCTION {
        string_function_vtable::<T>()
    } else {
        ptr::null()
    }
}

/// Upper-cases its input.
pub struct Teste;

impl Class for Teste {
    const NAME: &'static CStr = c"Teste";

    fn construct() -> Result<Self, String> {
        Ok(Teste)
    }

    fn query_interface(interface: &CStr) -> *const c_void {
        string_function::<Self>(interface)
    }
}

impl StringTransform for Teste {
    fn apply(&self, input: &str) -> Result<String, String> {
        Ok(input.to_uppercase())
    }
}

static INITIALIZED: AtomicUsize = AtomicUsize::new(0);
static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

/// Reports `<initializer runs>:<constructions>` as seen by this copy of the library.
pub struct Counter;

impl Class for Counter {
    const NAME: &'static CStr = c"fixtures.Counter";

    fn initialize() -> Result<(), String> {
        INITIALIZED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn construct() -> Result<Self, String> {
        CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
        Ok(Counter)
    }

    fn query_interface(interface: &CStr) -> *const c_void {
        string_function::<Self>(interface)
    }
}

impl StringTransform for Counter {
    fn apply(&self, _input: &str) -> Result<String, String> {
        Ok(format!(
            "{}:{}",
            INITIALIZED.load(Ordering::SeqCst),
            CONSTRUCTED.load(Ordering::SeqCst)
        ))
    }
}

pub struct Abstract;

impl Class for Abstract {
    const NAME: &'static CStr = c"fixtures.Abstract";
    const HAS_DEFAULT_CONSTRUCTOR: bool = false;

    fn construct() -> Result<Self, String> {
        Err("abstract".to_string())
    }
}

pub struct Failing;

impl Class for Failing {
    const NAME: &'static CStr = c"fixtures.Failing";

    fn construct() -> Result<Self, String> {
        Err("refusing to construct".to_string())
    }
}

pub struct Panicking;

impl Class for Panicking {
    const NAME: &'static CStr = c"fixtures.Panicking";

    fn construct() -> Result<Self, String> {
        panic!("constructor panicked on purpose")
    }
}

pub struct BrokenInit;

impl Class for BrokenInit {
    const NAME: &'static CStr = c"fixtures.BrokenInit";

    fn initialize() -> Result<(), String> {
        Err("static state unavailable".to_string())
    }

    fn construct() -> Result<Self, String> {
        Ok(BrokenInit)
    }
}

/// Implements no known interface.
pub struct Opaque;

impl Class for Opaque {
    const NAME: &'static CStr = c"fixtures.Opaque";

    fn construct() -> Result<Self, String> {
        Ok(Opaque)
    }
}

export_classes!(Teste, Counter, Abstract, Failing, Panicking, BrokenInit, Opaque);
