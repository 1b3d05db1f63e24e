//! C ABI over a process-wide [`TextShim`].
//!
//! Status codes: `0` success, negative values are [`STATUS_INVALID_HANDLE`],
//! [`STATUS_PARSE_ERROR`], [`STATUS_NULL_ARGUMENT`], [`STATUS_OUT_OF_RANGE`].
//!
//! Name and type queries copy a NUL-terminated string into a caller buffer
//! and return `-1` on any failure, the required size when the buffer is too
//! small, otherwise the number of bytes written.

use std::ffi::{c_char, CStr};
use std::path::Path;
use std::sync::OnceLock;

use crate::{ModuleHandle, ShimApi, ShimError, TextShim, ABI_VERSION};

pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_HANDLE: i32 = -1;
pub const STATUS_PARSE_ERROR: i32 = -2;
pub const STATUS_NULL_ARGUMENT: i32 = -3;
pub const STATUS_OUT_OF_RANGE: i32 = -4;

fn shim() -> &'static TextShim {
    static SHIM: OnceLock<TextShim> = OnceLock::new();
    SHIM.get_or_init(TextShim::new)
}

fn status_of(err: &ShimError) -> i32 {
    match err {
        ShimError::InvalidHandle(_) => STATUS_INVALID_HANDLE,
        ShimError::Parse { .. } | ShimError::Io { .. } => STATUS_PARSE_ERROR,
        ShimError::OutOfRange { .. } | ShimError::UnknownValue { .. } => STATUS_OUT_OF_RANGE,
    }
}

/// Copy `text` plus a terminator into `buffer`.
///
/// # Safety
/// `buffer` must point to `buffer_size` writable bytes.
unsafe fn write_c_string(text: &str, buffer: *mut u8, buffer_size: i32) -> i32 {
    if buffer.is_null() || buffer_size <= 0 || text.is_empty() {
        return -1;
    }
    let Ok(len) = i32::try_from(text.len()) else {
        return -1;
    };
    if buffer_size < len + 1 {
        return len + 1;
    }
    let out = std::slice::from_raw_parts_mut(buffer, text.len() + 1);
    out[..text.len()].copy_from_slice(text.as_bytes());
    out[text.len()] = 0;
    len
}

/// Store `result` in `out` as a status code.
///
/// # Safety
/// `out` must be null or point to a writable `T`.
unsafe fn write_out<T>(result: Result<T, ShimError>, out: *mut T) -> i32 {
    if out.is_null() {
        return STATUS_NULL_ARGUMENT;
    }
    match result {
        Ok(value) => {
            *out = value;
            STATUS_OK
        }
        Err(err) => status_of(&err),
    }
}

/// Packed ABI version, `major << 16 | minor`.
#[no_mangle]
pub extern "C" fn irbridge_shim_abi_version() -> u32 {
    ABI_VERSION.packed()
}

/// Parse `len` bytes at `data` and write the new handle to `out_handle`.
///
/// # Safety
/// `data` must point to `len` readable bytes and `out_handle` to a writable `u64`.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_open_buffer(
    data: *const u8,
    len: usize,
    out_handle: *mut u64,
) -> i32 {
    if data.is_null() || out_handle.is_null() {
        return STATUS_NULL_ARGUMENT;
    }
    let bytes = std::slice::from_raw_parts(data, len);
    match shim().open_buffer(bytes) {
        Ok(handle) => {
            *out_handle = handle.0;
            STATUS_OK
        }
        Err(err) => {
            tracing::debug!(%err, "open_buffer failed");
            status_of(&err)
        }
    }
}

/// Read and parse the file at the NUL-terminated UTF-8 `path`.
///
/// # Safety
/// `path` must be a valid C string and `out_handle` must point to a writable `u64`.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_open_path(path: *const c_char, out_handle: *mut u64) -> i32 {
    if path.is_null() || out_handle.is_null() {
        return STATUS_NULL_ARGUMENT;
    }
    let Ok(path) = CStr::from_ptr(path).to_str() else {
        return STATUS_PARSE_ERROR;
    };
    match shim().open_path(Path::new(path)) {
        Ok(handle) => {
            *out_handle = handle.0;
            STATUS_OK
        }
        Err(err) => {
            tracing::debug!(%err, path, "open_path failed");
            status_of(&err)
        }
    }
}

#[no_mangle]
pub extern "C" fn irbridge_shim_close(handle: u64) -> i32 {
    match shim().close(ModuleHandle(handle)) {
        Ok(()) => STATUS_OK,
        Err(err) => status_of(&err),
    }
}

/// # Safety
/// `out_count` must point to a writable `usize`.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_function_count(handle: u64, out_count: *mut usize) -> i32 {
    write_out(shim().function_count(ModuleHandle(handle)), out_count)
}

/// # Safety
/// `out_count` must point to a writable `usize`.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_block_count(handle: u64, func: usize, out_count: *mut usize) -> i32 {
    let count = shim().function(ModuleHandle(handle), func).map(|f| f.block_count);
    write_out(count, out_count)
}

/// Instructions in a block, terminator included.
///
/// # Safety
/// `out_count` must point to a writable `usize`.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_instruction_count(
    handle: u64,
    func: usize,
    block: usize,
    out_count: *mut usize,
) -> i32 {
    let count = shim()
        .block(ModuleHandle(handle), func, block)
        .map(|b| b.instruction_count);
    write_out(count, out_count)
}

/// Copy the display name of function `func` into `buffer`, NUL-terminated.
///
/// The demangled form is used when demangling changes the name. Returns
/// `-1` when there is no name (or any argument is invalid), the required
/// buffer size including the terminator when `buffer_size` is too small,
/// otherwise the number of bytes written excluding the terminator.
///
/// # Safety
/// `buffer` must point to `buffer_size` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_value_get_demangled_name(
    handle: u64,
    func: usize,
    buffer: *mut u8,
    buffer_size: i32,
) -> i32 {
    let handle = ModuleHandle(handle);
    let name = match (
        shim().function(handle, func),
        shim().demangled_name(handle, func),
    ) {
        (Ok(record), Ok(demangled)) => demangled.unwrap_or(record.name),
        _ => return -1,
    };
    write_c_string(&name, buffer, buffer_size)
}

/// Copy the type of local `name` (a parameter or instruction result of
/// function `func`, without the `%`) into `buffer`.
///
/// # Safety
/// `name` must be a valid C string and `buffer` must point to `buffer_size` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_value_type(
    handle: u64,
    func: usize,
    name: *const c_char,
    buffer: *mut u8,
    buffer_size: i32,
) -> i32 {
    if name.is_null() {
        return -1;
    }
    let Ok(name) = CStr::from_ptr(name).to_str() else {
        return -1;
    };
    match shim().value_type(ModuleHandle(handle), func, name) {
        Ok(ty) => write_c_string(&ty.to_string(), buffer, buffer_size),
        Err(_) => -1,
    }
}

/// # Safety
/// `buffer` must point to `buffer_size` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_function_return_type(
    handle: u64,
    func: usize,
    buffer: *mut u8,
    buffer_size: i32,
) -> i32 {
    match shim().function_return_type(ModuleHandle(handle), func) {
        Ok(ty) => write_c_string(&ty.to_string(), buffer, buffer_size),
        Err(_) => -1,
    }
}

/// Function signature in IR syntax, e.g. `i32 (i32, ptr, ...)`.
///
/// # Safety
/// `buffer` must point to `buffer_size` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_function_type(
    handle: u64,
    func: usize,
    buffer: *mut u8,
    buffer_size: i32,
) -> i32 {
    match shim().function_type(ModuleHandle(handle), func) {
        Ok(ty) => write_c_string(&ty.to_string(), buffer, buffer_size),
        Err(_) => -1,
    }
}

/// Raw bytes of the data-array initializer of global `global`.
///
/// `out_size` always receives the byte length, `0` when the global has no
/// data-array initializer. The bytes are copied when `buffer` holds at least
/// that many, otherwise [`STATUS_OUT_OF_RANGE`] is returned. A null `buffer`
/// queries the size alone. No terminator is appended.
///
/// # Safety
/// `out_size` must point to a writable `i32` and `buffer`, when not null,
/// to `buffer_size` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn irbridge_shim_constant_data_array_get_data(
    handle: u64,
    global: usize,
    buffer: *mut u8,
    buffer_size: i32,
    out_size: *mut i32,
) -> i32 {
    if out_size.is_null() {
        return STATUS_NULL_ARGUMENT;
    }
    *out_size = 0;
    let bytes = match shim().constant_data(ModuleHandle(handle), global) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return STATUS_OK,
        Err(err) => return status_of(&err),
    };
    let Ok(len) = i32::try_from(bytes.len()) else {
        return STATUS_OUT_OF_RANGE;
    };
    *out_size = len;
    if buffer.is_null() {
        return STATUS_OK;
    }
    if buffer_size < len {
        return STATUS_OUT_OF_RANGE;
    }
    std::slice::from_raw_parts_mut(buffer, bytes.len()).copy_from_slice(&bytes);
    STATUS_OK
}

/// `1` if the instruction carries `nsw`, `0` if not, negative status on error.
#[no_mangle]
pub extern "C" fn irbridge_shim_instruction_has_no_signed_wrap(
    handle: u64,
    func: usize,
    block: usize,
    index: usize,
) -> i32 {
    match shim().has_no_signed_wrap(ModuleHandle(handle), func, block, index) {
        Ok(flag) => i32::from(flag),
        Err(err) => status_of(&err),
    }
}

/// `1` if the instruction carries `nuw`, `0` if not, negative status on error.
#[no_mangle]
pub extern "C" fn irbridge_shim_instruction_has_no_unsigned_wrap(
    handle: u64,
    func: usize,
    block: usize,
    index: usize,
) -> i32 {
    match shim().has_no_unsigned_wrap(ModuleHandle(handle), func, block, index) {
        Ok(flag) => i32::from(flag),
        Err(err) => status_of(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &[u8] = b"@msg = private constant [3 x i8] c\"ok\\00\"\n@n = global i32 7\ndefine i32 @_Z3subii(i32 %a, i32 %b) {\n  %d = sub nsw i32 %a, %b\n  ret i32 %d\n}\n";

    fn open() -> u64 {
        let mut handle = 0u64;
        let status = unsafe { irbridge_shim_open_buffer(SRC.as_ptr(), SRC.len(), &mut handle) };
        assert_eq!(status, STATUS_OK);
        handle
    }

    #[test]
    fn abi_version_is_packed() {
        assert_eq!(irbridge_shim_abi_version(), ABI_VERSION.packed());
    }

    #[test]
    fn open_count_close() {
        let handle = open();
        let mut count = 0usize;
        assert_eq!(unsafe { irbridge_shim_function_count(handle, &mut count) }, STATUS_OK);
        assert_eq!(count, 1);
        assert_eq!(irbridge_shim_close(handle), STATUS_OK);
        assert_eq!(irbridge_shim_close(handle), STATUS_INVALID_HANDLE);
        assert_eq!(
            unsafe { irbridge_shim_function_count(handle, &mut count) },
            STATUS_INVALID_HANDLE
        );
    }

    #[test]
    fn malformed_and_null_inputs() {
        let bad = b"define {";
        let mut handle = 0u64;
        assert_eq!(
            unsafe { irbridge_shim_open_buffer(bad.as_ptr(), bad.len(), &mut handle) },
            STATUS_PARSE_ERROR
        );
        assert_eq!(
            unsafe { irbridge_shim_open_buffer(std::ptr::null(), 0, &mut handle) },
            STATUS_NULL_ARGUMENT
        );
    }

    #[test]
    fn demangled_name_buffer_protocol() {
        let handle = open();
        // "sub(int, int)" is 13 bytes.
        let mut small = [0u8; 4];
        let needed = unsafe {
            irbridge_shim_value_get_demangled_name(handle, 0, small.as_mut_ptr(), small.len() as i32)
        };
        assert_eq!(needed, 14);

        let mut buf = [0u8; 32];
        let written = unsafe {
            irbridge_shim_value_get_demangled_name(handle, 0, buf.as_mut_ptr(), buf.len() as i32)
        };
        assert_eq!(written, 13);
        assert_eq!(&buf[..14], b"sub(int, int)\0");

        assert_eq!(
            unsafe { irbridge_shim_value_get_demangled_name(handle, 5, buf.as_mut_ptr(), 32) },
            -1
        );
        irbridge_shim_close(handle);
    }

    #[test]
    fn wrap_flags() {
        let handle = open();
        assert_eq!(irbridge_shim_instruction_has_no_signed_wrap(handle, 0, 0, 0), 1);
        assert_eq!(irbridge_shim_instruction_has_no_unsigned_wrap(handle, 0, 0, 0), 0);
        assert_eq!(irbridge_shim_instruction_has_no_unsigned_wrap(handle, 0, 0, 7), STATUS_OUT_OF_RANGE);
        irbridge_shim_close(handle);
    }

    fn read_string(fill: impl Fn(*mut u8, i32) -> i32) -> Option<String> {
        let mut buf = [0u8; 64];
        let written = fill(buf.as_mut_ptr(), buf.len() as i32);
        let len = usize::try_from(written).ok()?;
        assert_eq!(buf[len], 0);
        Some(String::from_utf8(buf[..len].to_vec()).unwrap())
    }

    #[test]
    fn open_path_reads_a_file() {
        let path = std::env::temp_dir().join(format!("irbridge-shim-ffi-{}.ll", std::process::id()));
        std::fs::write(&path, SRC).unwrap();
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();

        let mut handle = 0u64;
        assert_eq!(unsafe { irbridge_shim_open_path(c_path.as_ptr(), &mut handle) }, STATUS_OK);
        let mut count = 0usize;
        assert_eq!(unsafe { irbridge_shim_function_count(handle, &mut count) }, STATUS_OK);
        assert_eq!(count, 1);
        irbridge_shim_close(handle);
        std::fs::remove_file(&path).unwrap();

        let missing = std::ffi::CString::new("/nonexistent/irbridge.ll").unwrap();
        assert_eq!(
            unsafe { irbridge_shim_open_path(missing.as_ptr(), &mut handle) },
            STATUS_PARSE_ERROR
        );
        assert_eq!(
            unsafe { irbridge_shim_open_path(std::ptr::null(), &mut handle) },
            STATUS_NULL_ARGUMENT
        );
    }

    #[test]
    fn block_and_instruction_counts() {
        let handle = open();
        let mut count = 0usize;
        assert_eq!(unsafe { irbridge_shim_block_count(handle, 0, &mut count) }, STATUS_OK);
        assert_eq!(count, 1);
        assert_eq!(unsafe { irbridge_shim_instruction_count(handle, 0, 0, &mut count) }, STATUS_OK);
        assert_eq!(count, 2);
        assert_eq!(
            unsafe { irbridge_shim_instruction_count(handle, 0, 3, &mut count) },
            STATUS_OUT_OF_RANGE
        );
        assert_eq!(
            unsafe { irbridge_shim_block_count(handle, 0, std::ptr::null_mut()) },
            STATUS_NULL_ARGUMENT
        );
        irbridge_shim_close(handle);
    }

    #[test]
    fn type_queries_render_ir_syntax() {
        let handle = open();
        let d = std::ffi::CString::new("d").unwrap();
        let zz = std::ffi::CString::new("zz").unwrap();
        assert_eq!(
            read_string(|buf, size| unsafe { irbridge_shim_value_type(handle, 0, d.as_ptr(), buf, size) })
                .as_deref(),
            Some("i32")
        );
        assert_eq!(
            read_string(|buf, size| unsafe { irbridge_shim_value_type(handle, 0, zz.as_ptr(), buf, size) }),
            None
        );
        assert_eq!(
            read_string(|buf, size| unsafe { irbridge_shim_function_return_type(handle, 0, buf, size) })
                .as_deref(),
            Some("i32")
        );
        assert_eq!(
            read_string(|buf, size| unsafe { irbridge_shim_function_type(handle, 0, buf, size) }).as_deref(),
            Some("i32 (i32, i32)")
        );

        // "i32 (i32, i32)" is 14 bytes.
        let mut small = [0u8; 4];
        assert_eq!(
            unsafe { irbridge_shim_function_type(handle, 0, small.as_mut_ptr(), small.len() as i32) },
            15
        );
        irbridge_shim_close(handle);
    }

    #[test]
    fn constant_data_reports_its_size() {
        let handle = open();
        let mut size = -1i32;
        assert_eq!(
            unsafe { irbridge_shim_constant_data_array_get_data(handle, 0, std::ptr::null_mut(), 0, &mut size) },
            STATUS_OK
        );
        assert_eq!(size, 3);

        let mut small = [0u8; 2];
        assert_eq!(
            unsafe { irbridge_shim_constant_data_array_get_data(handle, 0, small.as_mut_ptr(), 2, &mut size) },
            STATUS_OUT_OF_RANGE
        );
        assert_eq!(size, 3);

        let mut buf = [0xaau8; 8];
        assert_eq!(
            unsafe { irbridge_shim_constant_data_array_get_data(handle, 0, buf.as_mut_ptr(), 8, &mut size) },
            STATUS_OK
        );
        assert_eq!(&buf[..4], b"ok\0\xaa");

        // A scalar initializer is not a data array.
        assert_eq!(
            unsafe { irbridge_shim_constant_data_array_get_data(handle, 1, buf.as_mut_ptr(), 8, &mut size) },
            STATUS_OK
        );
        assert_eq!(size, 0);
        assert_eq!(
            unsafe { irbridge_shim_constant_data_array_get_data(handle, 9, buf.as_mut_ptr(), 8, &mut size) },
            STATUS_OUT_OF_RANGE
        );
        irbridge_shim_close(handle);
    }
}
