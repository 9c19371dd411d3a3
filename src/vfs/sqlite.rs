//! sqlite3_vfs implementation over in-memory backing stores
//!
//! Every database handle registers its own VFS under a unique name. The
//! main database file maps to the handle's shared store; journals and
//! temporary files get private scratch stores that vanish on close.

use super::store::{BackingStore, LockLevel};
use crate::error::{EngramError, Result};
use libsqlite3_sys as ffi;
use parking_lot::Mutex;
use rand::RngCore;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

pub(crate) type SharedStore = Arc<Mutex<BackingStore>>;

const MAX_PATHNAME: c_int = 512;
const SECTOR_SIZE: c_int = 4096;

static NEXT_VFS_ID: AtomicU64 = AtomicU64::new(0);

/// Data hung off `sqlite3_vfs::pAppData`
struct VfsState {
    name: CString,
    main: SharedStore,
}

/// SQLite-visible file; `base` must stay the first field
#[repr(C)]
struct VfsFile {
    base: ffi::sqlite3_file,
    store: SharedStore,
}

/// Owns one registered VFS and unregisters it on drop
///
/// Any connection opened through this VFS must be closed first.
pub(crate) struct VfsRegistration {
    vfs: *mut ffi::sqlite3_vfs,
    name: String,
}

// The raw pointer is only dereferenced under SQLite's VFS registry mutex
// and in Drop; the state it points to is Send.
unsafe impl Send for VfsRegistration {}

impl VfsRegistration {
    pub(crate) fn register(main: SharedStore) -> Result<Self> {
        let id = NEXT_VFS_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!("engram-mem-{}", id);
        let c_name = CString::new(name.clone())
            .map_err(|e| EngramError::Vfs(format!("Invalid VFS name: {}", e)))?;

        let state = Box::new(VfsState { name: c_name, main });
        let z_name = state.name.as_ptr();
        let state_ptr = Box::into_raw(state);

        let vfs = Box::into_raw(Box::new(ffi::sqlite3_vfs {
            iVersion: 2,
            szOsFile: std::mem::size_of::<VfsFile>() as c_int,
            mxPathname: MAX_PATHNAME,
            pNext: ptr::null_mut(),
            zName: z_name,
            pAppData: state_ptr as *mut c_void,
            xOpen: Some(vfs_open),
            xDelete: Some(vfs_delete),
            xAccess: Some(vfs_access),
            xFullPathname: Some(vfs_full_pathname),
            xDlOpen: None,
            xDlError: None,
            xDlSym: None,
            xDlClose: None,
            xRandomness: Some(vfs_randomness),
            xSleep: Some(vfs_sleep),
            xCurrentTime: Some(vfs_current_time),
            xGetLastError: Some(vfs_get_last_error),
            xCurrentTimeInt64: Some(vfs_current_time_int64),
            xSetSystemCall: None,
            xGetSystemCall: None,
            xNextSystemCall: None,
        }));

        let rc = unsafe { ffi::sqlite3_vfs_register(vfs, 0) };
        if rc != ffi::SQLITE_OK {
            unsafe {
                drop(Box::from_raw(vfs));
                drop(Box::from_raw(state_ptr));
            }
            return Err(EngramError::Vfs(format!(
                "sqlite3_vfs_register failed with code {}",
                rc
            )));
        }

        debug!("Registered VFS {}", name);
        Ok(Self { vfs, name })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for VfsRegistration {
    fn drop(&mut self) {
        unsafe {
            ffi::sqlite3_vfs_unregister(self.vfs);
            let state = (*self.vfs).pAppData as *mut VfsState;
            drop(Box::from_raw(self.vfs));
            if !state.is_null() {
                drop(Box::from_raw(state));
            }
        }
        debug!("Unregistered VFS {}", self.name);
    }
}

fn now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

// VFS callbacks

unsafe extern "C" fn vfs_open(
    vfs: *mut ffi::sqlite3_vfs,
    _z_name: *const c_char,
    file: *mut ffi::sqlite3_file,
    flags: c_int,
    p_out_flags: *mut c_int,
) -> c_int {
    let state = (*vfs).pAppData as *const VfsState;
    if state.is_null() {
        (*file).pMethods = ptr::null();
        return ffi::SQLITE_CANTOPEN;
    }

    let store = if flags & ffi::SQLITE_OPEN_MAIN_DB != 0 {
        Arc::clone(&(*state).main)
    } else {
        Arc::new(Mutex::new(BackingStore::memory(Vec::new())))
    };

    ptr::write(
        file as *mut VfsFile,
        VfsFile {
            base: ffi::sqlite3_file {
                pMethods: &IO_METHODS,
            },
            store,
        },
    );

    if !p_out_flags.is_null() {
        *p_out_flags = flags;
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_delete(
    _vfs: *mut ffi::sqlite3_vfs,
    _z_name: *const c_char,
    _sync_dir: c_int,
) -> c_int {
    // Scratch stores are released when their file closes
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_access(
    _vfs: *mut ffi::sqlite3_vfs,
    _z_name: *const c_char,
    _flags: c_int,
    p_res_out: *mut c_int,
) -> c_int {
    // No side files ever exist, so no hot journal is ever found
    *p_res_out = 0;
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_full_pathname(
    _vfs: *mut ffi::sqlite3_vfs,
    z_name: *const c_char,
    n_out: c_int,
    z_out: *mut c_char,
) -> c_int {
    let name = CStr::from_ptr(z_name).to_bytes_with_nul();
    if n_out < 0 || name.len() > n_out as usize {
        return ffi::SQLITE_CANTOPEN;
    }

    ptr::copy_nonoverlapping(name.as_ptr() as *const c_char, z_out, name.len());
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_randomness(
    _vfs: *mut ffi::sqlite3_vfs,
    n_byte: c_int,
    z_out: *mut c_char,
) -> c_int {
    if n_byte <= 0 {
        return 0;
    }
    let out = std::slice::from_raw_parts_mut(z_out as *mut u8, n_byte as usize);
    rand::thread_rng().fill_bytes(out);
    n_byte
}

unsafe extern "C" fn vfs_sleep(_vfs: *mut ffi::sqlite3_vfs, microseconds: c_int) -> c_int {
    std::thread::sleep(Duration::from_micros(microseconds.max(0) as u64));
    microseconds
}

unsafe extern "C" fn vfs_current_time(_vfs: *mut ffi::sqlite3_vfs, p_time_out: *mut f64) -> c_int {
    // Julian day number
    *p_time_out = 2440587.5 + now().as_secs_f64() / 86400.0;
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_current_time_int64(
    _vfs: *mut ffi::sqlite3_vfs,
    p_time_out: *mut ffi::sqlite3_int64,
) -> c_int {
    // Julian day in milliseconds
    *p_time_out = 210866760000000i64 + now().as_millis() as i64;
    ffi::SQLITE_OK
}

unsafe extern "C" fn vfs_get_last_error(
    _vfs: *mut ffi::sqlite3_vfs,
    _n_byte: c_int,
    _z_err_msg: *mut c_char,
) -> c_int {
    0
}

// File I/O methods

static IO_METHODS: ffi::sqlite3_io_methods = ffi::sqlite3_io_methods {
    iVersion: 1,
    xClose: Some(file_close),
    xRead: Some(file_read),
    xWrite: Some(file_write),
    xTruncate: Some(file_truncate),
    xSync: Some(file_sync),
    xFileSize: Some(file_file_size),
    xLock: Some(file_lock),
    xUnlock: Some(file_unlock),
    xCheckReservedLock: Some(file_check_reserved_lock),
    xFileControl: Some(file_file_control),
    xSectorSize: Some(file_sector_size),
    xDeviceCharacteristics: Some(file_device_characteristics),
    xShmMap: None,
    xShmLock: None,
    xShmBarrier: None,
    xShmUnmap: None,
    xFetch: None,
    xUnfetch: None,
};

unsafe fn store_of<'a>(file: *mut ffi::sqlite3_file) -> &'a SharedStore {
    &(*(file as *mut VfsFile)).store
}

unsafe extern "C" fn file_close(file: *mut ffi::sqlite3_file) -> c_int {
    ptr::drop_in_place(file as *mut VfsFile);
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_read(
    file: *mut ffi::sqlite3_file,
    buf: *mut c_void,
    amt: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    if offset < 0 || amt < 0 {
        return ffi::SQLITE_IOERR_READ;
    }

    let out = std::slice::from_raw_parts_mut(buf as *mut u8, amt as usize);
    let copied = store_of(file).lock().read(offset as u64, out);

    if copied < out.len() {
        ffi::SQLITE_IOERR_SHORT_READ
    } else {
        ffi::SQLITE_OK
    }
}

unsafe extern "C" fn file_write(
    file: *mut ffi::sqlite3_file,
    buf: *const c_void,
    amt: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    if offset < 0 || amt < 0 {
        return ffi::SQLITE_IOERR_WRITE;
    }

    let data = std::slice::from_raw_parts(buf as *const u8, amt as usize);
    match store_of(file).lock().write(offset as u64, data) {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_WRITE,
    }
}

unsafe extern "C" fn file_truncate(file: *mut ffi::sqlite3_file, size: ffi::sqlite3_int64) -> c_int {
    if size < 0 {
        return ffi::SQLITE_IOERR_TRUNCATE;
    }

    match store_of(file).lock().truncate(size as u64) {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_TRUNCATE,
    }
}

unsafe extern "C" fn file_sync(file: *mut ffi::sqlite3_file, _flags: c_int) -> c_int {
    match store_of(file).lock().sync() {
        Ok(()) => ffi::SQLITE_OK,
        Err(_) => ffi::SQLITE_IOERR_FSYNC,
    }
}

unsafe extern "C" fn file_file_size(
    file: *mut ffi::sqlite3_file,
    p_size: *mut ffi::sqlite3_int64,
) -> c_int {
    *p_size = store_of(file).lock().file_size() as ffi::sqlite3_int64;
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_lock(file: *mut ffi::sqlite3_file, level: c_int) -> c_int {
    match LockLevel::from_raw(level) {
        Some(level) => {
            store_of(file).lock().lock(level);
            ffi::SQLITE_OK
        }
        None => ffi::SQLITE_IOERR_LOCK,
    }
}

unsafe extern "C" fn file_unlock(file: *mut ffi::sqlite3_file, level: c_int) -> c_int {
    match LockLevel::from_raw(level) {
        Some(level) => {
            store_of(file).lock().unlock(level);
            ffi::SQLITE_OK
        }
        None => ffi::SQLITE_IOERR_UNLOCK,
    }
}

unsafe extern "C" fn file_check_reserved_lock(
    file: *mut ffi::sqlite3_file,
    p_res_out: *mut c_int,
) -> c_int {
    let reserved = store_of(file).lock().lock_level() >= LockLevel::Reserved;
    *p_res_out = reserved as c_int;
    ffi::SQLITE_OK
}

unsafe extern "C" fn file_file_control(
    _file: *mut ffi::sqlite3_file,
    _op: c_int,
    _p_arg: *mut c_void,
) -> c_int {
    ffi::SQLITE_NOTFOUND
}

unsafe extern "C" fn file_sector_size(_file: *mut ffi::sqlite3_file) -> c_int {
    SECTOR_SIZE
}

unsafe extern "C" fn file_device_characteristics(_file: *mut ffi::sqlite3_file) -> c_int {
    ffi::SQLITE_IOCAP_POWERSAFE_OVERWRITE | ffi::SQLITE_IOCAP_SAFE_APPEND | ffi::SQLITE_IOCAP_SEQUENTIAL
}
