//! Objects created by a loading scope and the capabilities they can be adapted to.

use crate::scope::LoadScope;
use archload_abi::{ByteSlice, ClassDescriptor, OwnedBytes, StringFunctionVTable, STRING_FUNCTION};
use std::ffi::{c_void, CStr};
use std::fmt;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Call failed: {0}")]
    Failed(String),

    #[error("Result is not valid UTF-8")]
    InvalidUtf8,
}

/// An object of a dynamically loaded class.
///
/// The instance keeps its [`LoadScope`] alive: the code behind it stays
/// mapped until the instance (and every other handle on the scope) is
/// dropped.
pub struct Instance {
    object: *mut c_void,
    descriptor: *const ClassDescriptor,
    class: String,
    scope: Arc<LoadScope>,
}

// Exported classes must be Send + Sync, and the descriptor is immutable data
// inside a library that `scope` keeps loaded.
unsafe impl Send for Instance {}
unsafe impl Sync for Instance {}

impl Instance {
    /// # Safety
    /// `object` must come from `descriptor`'s constructor, and `descriptor`
    /// must live inside one of `scope`'s libraries.
    pub(crate) unsafe fn new(
        scope: Arc<LoadScope>,
        descriptor: &ClassDescriptor,
        object: *mut c_void,
        class: &str,
    ) -> Self {
        Self {
            object,
            descriptor,
            class: class.to_string(),
            scope,
        }
    }

    fn descriptor(&self) -> &ClassDescriptor {
        unsafe { &*self.descriptor }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    pub fn archive(&self) -> &Path {
        self.scope.archive()
    }

    pub fn scope(&self) -> &Arc<LoadScope> {
        &self.scope
    }

    fn vtable(&self, interface: &CStr) -> Option<NonNull<c_void>> {
        let vtable = unsafe { (self.descriptor().query_interface)(interface.as_ptr()) };
        NonNull::new(vtable.cast_mut())
    }

    pub fn implements(&self, interface: &CStr) -> bool {
        self.vtable(interface).is_some()
    }

    /// View this instance through capability `C`, if its class implements it
    pub fn adapt<'a, C: Capability<'a>>(&'a self) -> Option<C> {
        let vtable = self.vtable(C::INTERFACE)?;
        Some(unsafe { C::from_vtable(self, vtable) })
    }

    pub fn as_string_function(&self) -> Option<StringFunction<'_>> {
        self.adapt()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // Runs before `scope` is released, while the library is still mapped
        unsafe { (self.descriptor().destroy)(self.object) }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class)
            .field("archive", &self.scope.archive())
            .field("scope", &self.scope.id())
            .finish()
    }
}

/// A typed view over an [`Instance`], backed by the vtable its class returns
/// for [`Capability::INTERFACE`].
pub trait Capability<'a>: Sized {
    const INTERFACE: &'static CStr;

    /// # Safety
    /// `vtable` must be what `instance`'s class returned for `INTERFACE`.
    unsafe fn from_vtable(instance: &'a Instance, vtable: NonNull<c_void>) -> Self;
}

/// Single-argument string transform
pub struct StringFunction<'a> {
    instance: &'a Instance,
    vtable: &'a StringFunctionVTable,
}

impl<'a> Capability<'a> for StringFunction<'a> {
    const INTERFACE: &'static CStr = STRING_FUNCTION;

    unsafe fn from_vtable(instance: &'a Instance, vtable: NonNull<c_void>) -> Self {
        Self {
            instance,
            vtable: vtable.cast::<StringFunctionVTable>().as_ref(),
        }
    }
}

impl StringFunction<'_> {
    pub fn apply(&self, input: &str) -> Result<String, CallError> {
        let mut output = OwnedBytes::empty();
        let ok = unsafe {
            (self.vtable.apply)(
                self.instance.object,
                ByteSlice::new(input.as_bytes()),
                &mut output,
            )
        };
        let bytes = unsafe { take_bytes(self.instance.descriptor(), output) };

        if !ok {
            return Err(CallError::Failed(String::from_utf8_lossy(&bytes).into_owned()));
        }
        String::from_utf8(bytes).map_err(|_| CallError::InvalidUtf8)
    }
}

/// Copy a buffer the library allocated, then hand it back to the library.
///
/// # Safety
/// `bytes` must be null or have been allocated by `descriptor`'s library.
pub(crate) unsafe fn take_bytes(descriptor: &ClassDescriptor, bytes: OwnedBytes) -> Vec<u8> {
    if bytes.is_null() {
        return Vec::new();
    }
    let copy = bytes.as_bytes().to_vec();
    (descriptor.free_bytes)(bytes);
    copy
}
