//! Attaching to the game process and enumerating its modules

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Executables of supported Source engine games
pub const DEFAULT_PROCESS_NAMES: &[&str] = &["hl2.exe", "bms.exe"];

/// A module loaded in the target process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleImage {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl ModuleImage {
    pub fn new(name: impl Into<String>, base: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            base,
            size,
        }
    }

    pub fn end(&self) -> u64 {
        self.base + self.size
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Find a module by case-insensitive name
pub fn find_module<'a>(modules: &'a [ModuleImage], name: &str) -> Option<&'a ModuleImage> {
    modules.iter().find(|m| m.name.eq_ignore_ascii_case(name))
}

/// Read-only handle to the game process
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub base_address: u64,
    pub modules: Vec<ModuleImage>,
    #[cfg(target_os = "windows")]
    handle: windows::Win32::Foundation::HANDLE,
}

impl ProcessHandle {
    pub fn module(&self, name: &str) -> Option<&ModuleImage> {
        find_module(&self.modules, name)
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use std::ffi::c_void;

    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW,
        PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPMODULE,
        TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
    };

    use super::{ModuleImage, ProcessHandle};
    use crate::error::{Error, Result};

    const STILL_ACTIVE: u32 = 259;

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    fn find_pid(names: &[&str]) -> Result<(u32, String)> {
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0)
                .map_err(|e| Error::ProcessNotFound(e.to_string()))?;

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            let mut found = None;
            let mut ok = Process32FirstW(snapshot, &mut entry).is_ok();
            while ok {
                let exe = wide_to_string(&entry.szExeFile);
                if names.iter().any(|n| n.eq_ignore_ascii_case(&exe)) {
                    found = Some((entry.th32ProcessID, exe));
                    break;
                }
                ok = Process32NextW(snapshot, &mut entry).is_ok();
            }

            let _ = CloseHandle(snapshot);
            found.ok_or_else(|| Error::ProcessNotFound(names.join(", ")))
        }
    }

    fn enumerate_modules(pid: u32) -> Result<Vec<ModuleImage>> {
        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid)
                .map_err(|e| Error::ProcessOpenFailed(e.to_string()))?;

            let mut entry = MODULEENTRY32W {
                dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };

            let mut modules = Vec::new();
            let mut ok = Module32FirstW(snapshot, &mut entry).is_ok();
            while ok {
                modules.push(ModuleImage::new(
                    wide_to_string(&entry.szModule),
                    entry.modBaseAddr as u64,
                    u64::from(entry.modBaseSize),
                ));
                ok = Module32NextW(snapshot, &mut entry).is_ok();
            }

            let _ = CloseHandle(snapshot);
            Ok(modules)
        }
    }

    impl ProcessHandle {
        /// Find the first running process matching one of `names` and open it for reading
        pub fn find_and_open(names: &[&str]) -> Result<Self> {
            let (pid, name) = find_pid(names)?;
            let handle: HANDLE = unsafe {
                OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid)
                    .map_err(|e| Error::ProcessOpenFailed(e.to_string()))?
            };

            let modules = enumerate_modules(pid)?;
            let base_address = modules
                .iter()
                .find(|m| m.name.eq_ignore_ascii_case(&name))
                .map(|m| m.base)
                .unwrap_or(0);
            debug!("Opened {} (pid {}, {} modules)", name, pid, modules.len());

            Ok(Self {
                pid,
                name,
                base_address,
                modules,
                handle,
            })
        }

        /// Re-read the module list; game DLLs load after the launcher starts
        pub fn refresh_modules(&mut self) -> Result<()> {
            self.modules = enumerate_modules(self.pid)?;
            Ok(())
        }

        pub fn is_alive(&self) -> bool {
            let mut code = 0u32;
            unsafe { GetExitCodeProcess(self.handle, &mut code).is_ok() && code == STILL_ACTIVE }
        }

        pub fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            let mut read = 0usize;
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as *const c_void,
                    buffer.as_mut_ptr() as *mut c_void,
                    size,
                    Some(&mut read),
                )
            }
            .map_err(|e| Error::read_failed(address, e.to_string()))?;

            if read != size {
                return Err(Error::read_failed(
                    address,
                    format!("partial read ({} of {} bytes)", read, size),
                ));
            }
            Ok(buffer)
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(not(target_os = "windows"))]
impl ProcessHandle {
    pub fn find_and_open(_names: &[&str]) -> Result<Self> {
        Err(Error::Unsupported(
            "attaching to a process requires Windows".to_string(),
        ))
    }

    pub fn refresh_modules(&mut self) -> Result<()> {
        Err(Error::Unsupported(
            "module enumeration requires Windows".to_string(),
        ))
    }

    pub fn is_alive(&self) -> bool {
        false
    }

    pub fn read_bytes(&self, address: u64, _size: usize) -> Result<Vec<u8>> {
        Err(Error::read_failed(address, "unsupported platform"))
    }
}
