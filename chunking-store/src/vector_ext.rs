//! Making the sqlite-vec `vec0` module available on a connection.

use std::path::Path;

use rusqlite::Connection;

use crate::StoreError;

/// Register the statically linked extension for every connection opened
/// afterwards in this process. Idempotent.
#[cfg(feature = "sqlite-vec")]
pub fn register_bundled() -> bool {
    use std::os::raw::{c_char, c_int};
    use std::sync::Once;

    use rusqlite::ffi;

    type EntryPoint =
        unsafe extern "C" fn(*mut ffi::sqlite3, *mut *const c_char, *const ffi::sqlite3_api_routines) -> c_int;

    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| unsafe {
        let init = std::mem::transmute::<*const (), EntryPoint>(sqlite_vec::sqlite3_vec_init as *const ());
        ffi::sqlite3_auto_extension(Some(init));
    });
    true
}

#[cfg(not(feature = "sqlite-vec"))]
pub fn register_bundled() -> bool {
    false
}

/// Load the extension from a shared library on an open connection.
pub fn load_dynamic(conn: &Connection, path: &Path) -> Result<(), StoreError> {
    if !path.exists() {
        return Err(StoreError::VectorExtension(format!("`{}` does not exist", path.display())));
    }
    unsafe {
        conn.load_extension_enable()?;
        let loaded = conn.load_extension(path, None);
        conn.load_extension_disable()?;
        loaded.map_err(|e| StoreError::VectorExtension(format!("loading `{}`: {e}", path.display())))
    }
}

/// Version string of the loaded extension, `None` when `vec0` is unavailable.
pub fn vec_version(conn: &Connection) -> Option<String> {
    conn.query_row("SELECT vec_version()", [], |r| r.get::<_, String>(0)).ok()
}
