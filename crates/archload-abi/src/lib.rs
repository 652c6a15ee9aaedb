//! C ABI shared between the `archload` host and the native libraries it loads.
//!
//! A library describes each class it exports with a [`ClassDescriptor`] and
//! publishes them all through [`export_classes!`], which emits the
//! `archload_class_table` symbol. Entry points generated here catch panics,
//! so nothing unwinds across the C boundary.

use std::any::Any;
use std::ffi::{c_char, c_void, CStr};
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Symbol every class library exports, NUL-terminated for `dlsym`.
pub const CLASS_TABLE_SYMBOL: &[u8] = b"archload_class_table\0";

/// Interface name answered with a [`StringFunctionVTable`].
pub const STRING_FUNCTION: &CStr = c"archload.StringFunction";

pub type InitializeFn = unsafe extern "C" fn(error: *mut OwnedBytes) -> bool;
pub type ConstructFn = unsafe extern "C" fn(error: *mut OwnedBytes) -> *mut c_void;
pub type DestroyFn = unsafe extern "C" fn(object: *mut c_void);
pub type QueryInterfaceFn = unsafe extern "C" fn(interface: *const c_char) -> *const c_void;
pub type FreeBytesFn = unsafe extern "C" fn(bytes: OwnedBytes);
pub type ClassTableFn = unsafe extern "C" fn() -> ClassTable;

/// Bytes borrowed from the caller for the duration of one call.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteSlice {
    pub ptr: *const u8,
    pub len: usize,
}

impl ByteSlice {
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
        }
    }

    /// # Safety
    /// `ptr` must point at `len` readable bytes that stay valid for `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(self.ptr, self.len)
        }
    }
}

/// A buffer allocated on one side of the boundary. Only the allocating side
/// may release it, through its `free_bytes` entry point.
#[repr(C)]
#[derive(Debug)]
pub struct OwnedBytes {
    pub ptr: *mut u8,
    pub len: usize,
    pub cap: usize,
}

impl OwnedBytes {
    pub const fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        let mut bytes = ManuallyDrop::new(bytes);
        Self {
            ptr: bytes.as_mut_ptr(),
            len: bytes.len(),
            cap: bytes.capacity(),
        }
    }

    pub fn from_string(text: String) -> Self {
        Self::from_vec(text.into_bytes())
    }

    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// # Safety
    /// The buffer must still be alive (not yet passed to `free_bytes`).
    pub unsafe fn as_bytes(&self) -> &[u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(self.ptr, self.len)
        }
    }

    /// # Safety
    /// Must only be called in the binary that produced the buffer with
    /// [`OwnedBytes::from_vec`], and at most once.
    pub unsafe fn into_vec(self) -> Vec<u8> {
        if self.ptr.is_null() {
            Vec::new()
        } else {
            Vec::from_raw_parts(self.ptr, self.len, self.cap)
        }
    }
}

/// Everything the host needs to initialize, construct, adapt and destroy
/// objects of one class.
#[repr(C)]
pub struct ClassDescriptor {
    /// Fully-qualified class name, NUL-terminated.
    pub name: *const c_char,
    pub initialize: InitializeFn,
    /// `None` when the class has no default constructor.
    pub construct: Option<ConstructFn>,
    pub destroy: DestroyFn,
    pub query_interface: QueryInterfaceFn,
    pub free_bytes: FreeBytesFn,
}

// Descriptors are immutable and only point at static data.
unsafe impl Sync for ClassDescriptor {}

impl ClassDescriptor {
    pub const fn of<T: Class>() -> Self {
        Self {
            name: T::NAME.as_ptr(),
            initialize: initialize_raw::<T>,
            construct: if T::HAS_DEFAULT_CONSTRUCTOR {
                Some(construct_raw::<T>)
            } else {
                None
            },
            destroy: destroy_raw::<T>,
            query_interface: query_interface_raw::<T>,
            free_bytes: free_bytes_raw,
        }
    }

    /// # Safety
    /// `name` must point at a NUL-terminated string that outlives `self`.
    pub unsafe fn name(&self) -> &CStr {
        CStr::from_ptr(self.name)
    }
}

/// The value returned by `archload_class_table`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ClassTable {
    pub classes: *const ClassDescriptor,
    pub len: usize,
}

impl ClassTable {
    /// # Safety
    /// `classes` must point at `len` descriptors that stay valid for `'a`.
    pub unsafe fn as_slice<'a>(&self) -> &'a [ClassDescriptor] {
        if self.classes.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(self.classes, self.len)
        }
    }
}

/// Vtable behind [`STRING_FUNCTION`]. `apply` writes the result, or an error
/// message when it returns `false`, into `output`.
#[repr(C)]
pub struct StringFunctionVTable {
    pub apply:
        unsafe extern "C" fn(object: *const c_void, input: ByteSlice, output: *mut OwnedBytes) -> bool,
}

/// A type a library exports as a class.
pub trait Class: Send + Sync + Sized + 'static {
    /// Fully-qualified name the host resolves, e.g. `c"com.example.Upper"`.
    const NAME: &'static CStr;

    const HAS_DEFAULT_CONSTRUCTOR: bool = true;

    /// Static initializer, run once per loading scope before the first
    /// construction.
    fn initialize() -> Result<(), String> {
        Ok(())
    }

    /// Default constructor. Never called when `HAS_DEFAULT_CONSTRUCTOR` is false.
    fn construct() -> Result<Self, String>;

    /// Vtable for `interface`, or null when the class does not implement it.
    fn query_interface(interface: &CStr) -> *const c_void {
        let _ = interface;
        ptr::null()
    }
}

/// Library-side half of [`STRING_FUNCTION`].
pub trait StringTransform {
    fn apply(&self, input: &str) -> Result<String, String>;
}

struct StringFunctionImpl<T>(PhantomData<T>);

impl<T: Class + StringTransform> StringFunctionImpl<T> {
    const VTABLE: &'static StringFunctionVTable = &StringFunctionVTable {
        apply: apply_string_raw::<T>,
    };
}

/// The pointer `query_interface` returns for [`STRING_FUNCTION`].
pub fn string_function_vtable<T: Class + StringTransform>() -> *const c_void {
    let vtable: *const StringFunctionVTable = StringFunctionImpl::<T>::VTABLE;
    vtable.cast()
}

/// Emits the `archload_class_table` symbol listing the given [`Class`] types.
#[macro_export]
macro_rules! export_classes {
    ($($class:ty),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn archload_class_table() -> $crate::ClassTable {
            static CLASSES: &[$crate::ClassDescriptor] =
                &[$($crate::ClassDescriptor::of::<$class>()),+];
            $crate::ClassTable {
                classes: CLASSES.as_ptr(),
                len: CLASSES.len(),
            }
        }
    };
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

unsafe fn report(error: *mut OwnedBytes, message: String) {
    if !error.is_null() {
        error.write(OwnedBytes::from_string(message));
    }
}

unsafe extern "C" fn initialize_raw<T: Class>(error: *mut OwnedBytes) -> bool {
    match panic::catch_unwind(T::initialize) {
        Ok(Ok(())) => true,
        Ok(Err(message)) => {
            report(error, message);
            false
        }
        Err(payload) => {
            report(error, format!("initializer panicked: {}", panic_message(payload)));
            false
        }
    }
}

unsafe extern "C" fn construct_raw<T: Class>(error: *mut OwnedBytes) -> *mut c_void {
    match panic::catch_unwind(T::construct) {
        Ok(Ok(object)) => Box::into_raw(Box::new(object)).cast(),
        Ok(Err(message)) => {
            report(error, message);
            ptr::null_mut()
        }
        Err(payload) => {
            report(error, format!("constructor panicked: {}", panic_message(payload)));
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn destroy_raw<T: Class>(object: *mut c_void) {
    if object.is_null() {
        return;
    }
    let object = object.cast::<T>();
    let _ = panic::catch_unwind(AssertUnwindSafe(|| drop(Box::from_raw(object))));
}

unsafe extern "C" fn query_interface_raw<T: Class>(interface: *const c_char) -> *const c_void {
    if interface.is_null() {
        return ptr::null();
    }
    let interface = CStr::from_ptr(interface);
    panic::catch_unwind(|| T::query_interface(interface)).unwrap_or(ptr::null())
}

unsafe extern "C" fn free_bytes_raw(bytes: OwnedBytes) {
    drop(bytes.into_vec());
}

unsafe extern "C" fn apply_string_raw<T: Class + StringTransform>(
    object: *const c_void,
    input: ByteSlice,
    output: *mut OwnedBytes,
) -> bool {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let this = &*object.cast::<T>();
        let input = std::str::from_utf8(input.as_bytes())
            .map_err(|e| format!("input is not valid UTF-8: {}", e))?;
        this.apply(input)
    }));

    let (ok, text) = match result {
        Ok(Ok(text)) => (true, text),
        Ok(Err(message)) => (false, message),
        Err(payload) => (false, format!("call panicked: {}", panic_message(payload))),
    };
    if !output.is_null() {
        output.write(OwnedBytes::from_string(text));
    }
    ok
}
