//! The dispatcher (C6): resolves a component role plus target `(arch, os)` tags to a concrete,
//! constructed implementation.
//!
//! `qiling`'s dispatcher computes a module path and a class/function name, then dynamically
//! imports it (`arch.<arch_str>` / `QlArch<ARCH_UPPER>`, and so on). Per the redesign flagged in
//! spec.md §9, this is replaced with a [`Registry`]: a statically-enumerated table of constructor
//! functions keyed the same way the import path would have been, looked up instead of imported.
//! No `dlopen`/reflection-style loading happens anywhere in this crate.
#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use binhost_arch::{Arch, Descriptor};
use binhost_loader::{ElfLoader, Loaded, Loader, LoaderError, MachOLoader, PeLoader};
use binhost_memory::{HostEngine, MemoryManager};
use binhost_os::{FreeBsd, Linux, MacOs, Os, OsPersonality, Windows};

/// A component role the dispatcher can resolve, matching spec.md §4.6's role list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The architecture descriptor / core.
    Arch,
    /// The OS personality.
    Os,
    /// The image loader.
    Loader,
    /// The memory manager. Fixed: does not vary by arch or OS.
    Memory,
    /// The register file. Fixed: does not vary by arch or OS, and is out of scope for this
    /// framework (see the `arch` crate's Non-goals) — resolving it only confirms the role is
    /// registered, it does not construct a real register file.
    Register,
    /// The syscall table for a given `(os, arch)` pair.
    SyscallTable,
}

/// Failure to resolve a [`Role`] against the tags supplied.
///
/// Distinguishes "nothing is registered for this role at all" from "this role is registered, but
/// not for this specific arch/OS pair", mirroring `qiling`'s module-not-found vs.
/// function-not-found distinction without the two literally being import failures.
#[derive(Clone, Copy, Debug, thiserror::Error)]
pub enum DispatchError {
    /// No constructor is registered for `role` at all.
    #[error("no module registered for role {role:?}")]
    ModuleNotFound {
        /// The role that was requested.
        role: Role,
    },
    /// A constructor is registered for `role`, but not for the requested `arch`/`os` combination.
    #[error("role {role:?} has no entry for arch={arch:?} os={os:?}")]
    FunctionNotFound {
        /// The role that was requested.
        role: Role,
        /// The architecture tag that was requested, if the role is arch-keyed.
        arch: Option<Arch>,
        /// The OS tag that was requested, if the role is OS-keyed.
        os: Option<Os>,
    },
}

/// The registration key the `arch` role is looked up under.
///
/// `Arch::X8664` resolves through the `x86` entry, matching spec.md §4.6's "the x86_64 arch uses
/// the x86 module" — the registry only ever holds one constructor for the pair, and the concrete
/// [`Descriptor`] returned still reflects the architecture actually requested.
fn arch_registration_key(arch: Arch) -> Arch {
    match arch {
        Arch::X8664 => Arch::X86,
        other => other,
    }
}

/// The loader role's registration key is derived from the OS, not declared directly: `ELF` for
/// Linux/FreeBSD, `MACHO` for macOS, `PE` for Windows, matching spec.md §4.6's `loader_str`.
fn loader_registration_os(os: Os) -> Os {
    os
}

/// A resolvable OS-personality constructor.
type OsCtor = fn() -> Box<dyn OsPersonality>;

/// An object-safe loader, monomorphized to the in-tree [`HostEngine`] backend.
///
/// [`Loader::load`] is generic over the memory engine it places segments into, which is not
/// object-safe; the registry only ever needs to hand back a loader for the reference engine, so
/// this adapter narrows to that one concrete instantiation. An embedder wiring up a different
/// engine backend constructs its own `Loader` directly instead of going through the registry.
pub trait DynLoader {
    /// See [`Loader::load`].
    fn load(&self, image: &[u8], mm: &mut MemoryManager<HostEngine>) -> Result<Loaded, LoaderError>;
}

impl<T: Loader> DynLoader for T {
    fn load(&self, image: &[u8], mm: &mut MemoryManager<HostEngine>) -> Result<Loaded, LoaderError> {
        Loader::load(self, image, mm)
    }
}

/// A resolvable loader constructor.
type LoaderCtor = fn() -> Box<dyn DynLoader>;

/// Placeholder identifying which syscall table a `(os, arch)` pair resolves to.
///
/// Full per-OS syscall tables are out of scope for this framework (see `os`'s crate-level docs);
/// what's registered here is a marker identifying which `(os, arch)` table would be dispatched
/// to, proving the role resolves the way spec.md §4.6 describes without implementing a guest ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyscallTable {
    /// The OS this table services.
    pub os: Os,
    /// The architecture this table services.
    pub arch: Arch,
}

/// The static `(role, arch, os)` registry.
///
/// Built once via [`Registry::with_defaults`] and then only read from; there is no mechanism to
/// register additional entries at runtime, by design — the whole point of the redesign is that
/// the set of pluggable components is closed and known at compile time.
pub struct Registry {
    /// `arch` role entries, keyed by [`arch_registration_key`].
    arch: BTreeMap<Arch, ()>,
    /// `os` role entries, keyed by [`Os`].
    os: BTreeMap<Os, OsCtor>,
    /// `loader` role entries, keyed by the OS the loader is derived from.
    loader: BTreeMap<Os, LoaderCtor>,
    /// `syscall-table` role entries, keyed by `(os, arch)`.
    syscall_table: BTreeMap<(Os, Arch), SyscallTable>,
}

impl Registry {
    /// Builds the registry populated with every component this framework ships: all five
    /// [`Arch`] variants, all four [`Os`] personalities, the ELF/Mach-O/PE loaders, and a
    /// syscall-table marker for every `(os, arch)` combination.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut arch = BTreeMap::new();
        for a in [Arch::X86, Arch::Arm, Arch::Arm64, Arch::Mips32] {
            arch.insert(a, ());
        }

        let mut os: BTreeMap<Os, OsCtor> = BTreeMap::new();
        os.insert(Os::Linux, (|| Box::new(Linux::default()) as Box<dyn OsPersonality>) as OsCtor);
        os.insert(Os::FreeBsd, (|| Box::new(FreeBsd::default()) as Box<dyn OsPersonality>) as OsCtor);
        os.insert(Os::MacOs, (|| Box::new(MacOs::default()) as Box<dyn OsPersonality>) as OsCtor);
        os.insert(Os::Windows, (|| Box::new(Windows::default()) as Box<dyn OsPersonality>) as OsCtor);

        let mut loader: BTreeMap<Os, LoaderCtor> = BTreeMap::new();
        loader.insert(Os::Linux, (|| Box::new(ElfLoader) as Box<dyn DynLoader>) as LoaderCtor);
        loader.insert(Os::FreeBsd, (|| Box::new(ElfLoader) as Box<dyn DynLoader>) as LoaderCtor);
        loader.insert(Os::MacOs, (|| Box::new(MachOLoader) as Box<dyn DynLoader>) as LoaderCtor);
        loader.insert(Os::Windows, (|| Box::new(PeLoader) as Box<dyn DynLoader>) as LoaderCtor);

        let mut syscall_table = BTreeMap::new();
        for os_tag in [Os::Linux, Os::FreeBsd, Os::MacOs, Os::Windows] {
            for arch_tag in [Arch::X86, Arch::X8664, Arch::Arm, Arch::Arm64, Arch::Mips32] {
                syscall_table.insert((os_tag, arch_tag), SyscallTable { os: os_tag, arch: arch_tag });
            }
        }

        Self {
            arch,
            os,
            loader,
            syscall_table,
        }
    }

    /// Resolves the `arch` role: returns the [`Descriptor`] for `arch`, after checking that
    /// `arch`'s registration key (itself, or `x86` for `x86_64`) is actually registered.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::FunctionNotFound`] if no entry is registered for `arch`'s key.
    pub fn setup_arch(&self, arch: Arch) -> Result<Descriptor, DispatchError> {
        if self.arch.contains_key(&arch_registration_key(arch)) {
            Ok(arch.descriptor())
        } else {
            Err(DispatchError::FunctionNotFound {
                role: Role::Arch,
                arch: Some(arch),
                os: None,
            })
        }
    }

    /// Resolves the `os` role: constructs the [`OsPersonality`] registered for `os`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::FunctionNotFound`] if no personality is registered for `os`.
    pub fn setup_os(&self, os: Os) -> Result<Box<dyn OsPersonality>, DispatchError> {
        self.os
            .get(&os)
            .map(|ctor| ctor())
            .ok_or(DispatchError::FunctionNotFound { role: Role::Os, arch: None, os: Some(os) })
    }

    /// Resolves the `loader` role: constructs the loader derived from `os`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::FunctionNotFound`] if no loader is registered for `os`.
    pub fn setup_loader(&self, os: Os) -> Result<Box<dyn DynLoader>, DispatchError> {
        self.loader
            .get(&loader_registration_os(os))
            .map(|ctor| ctor())
            .ok_or(DispatchError::FunctionNotFound { role: Role::Loader, arch: None, os: Some(os) })
    }

    /// Resolves the `syscall-table` role for an `(os, arch)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::FunctionNotFound`] if no table is registered for the pair.
    pub fn setup_syscall_table(&self, os: Os, arch: Arch) -> Result<SyscallTable, DispatchError> {
        self.syscall_table
            .get(&(os, arch))
            .copied()
            .ok_or(DispatchError::FunctionNotFound { role: Role::SyscallTable, arch: Some(arch), os: Some(os) })
    }

    /// Resolves a component by role, dispatching to the role-specific setup function.
    ///
    /// This mirrors spec.md §6's `setup_component(role)` embedding-API entry point; callers that
    /// already know their role's concrete return type should prefer the typed `setup_*` methods
    /// instead, since this one can only report whether resolution succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ModuleNotFound`] for the fixed `memory`/`register` roles, which
    /// this crate does not construct (see [`Role::Memory`], [`Role::Register`]), and
    /// [`DispatchError::FunctionNotFound`] if `arch`/`os`/`loader`/`syscall-table` resolution
    /// fails for the given tags.
    pub fn setup_component(&self, role: Role, arch: Option<Arch>, os: Option<Os>) -> Result<(), DispatchError> {
        match role {
            Role::Arch => {
                let arch = arch.ok_or(DispatchError::ModuleNotFound { role })?;
                self.setup_arch(arch).map(|_| ())
            }
            Role::Os => {
                let os = os.ok_or(DispatchError::ModuleNotFound { role })?;
                self.setup_os(os).map(|_| ())
            }
            Role::Loader => {
                let os = os.ok_or(DispatchError::ModuleNotFound { role })?;
                self.setup_loader(os).map(|_| ())
            }
            Role::SyscallTable => {
                let os = os.ok_or(DispatchError::ModuleNotFound { role })?;
                let arch = arch.ok_or(DispatchError::ModuleNotFound { role })?;
                self.setup_syscall_table(os, arch).map(|_| ())
            }
            Role::Memory | Role::Register => Err(DispatchError::ModuleNotFound { role }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x86_64_arch_resolves_through_the_x86_entry() {
        let registry = Registry::with_defaults();
        let descriptor = registry.setup_arch(Arch::X8664).unwrap();
        assert_eq!(descriptor.arch, Arch::X8664);
        assert_eq!(descriptor.ptr_size, 8);
    }

    #[test]
    fn os_role_constructs_the_registered_personality() {
        let registry = Registry::with_defaults();
        let personality = registry.setup_os(Os::Windows).unwrap();
        assert_eq!(personality.os(), Os::Windows);
    }

    #[test]
    fn loader_role_is_derived_from_os_not_declared_directly() {
        let registry = Registry::with_defaults();
        assert!(registry.setup_loader(Os::Linux).is_ok());
        assert!(registry.setup_loader(Os::MacOs).is_ok());

        let mut mm = MemoryManager::new(64, HostEngine::new());
        let macho = registry.setup_loader(Os::MacOs).unwrap();
        assert!(matches!(macho.load(&[], &mut mm), Err(LoaderError::Unsupported)));
    }

    #[test]
    fn memory_and_register_roles_are_fixed_and_unresolvable_through_the_registry() {
        let registry = Registry::with_defaults();
        assert!(matches!(
            registry.setup_component(Role::Memory, None, None),
            Err(DispatchError::ModuleNotFound { role: Role::Memory })
        ));
        assert!(matches!(
            registry.setup_component(Role::Register, None, None),
            Err(DispatchError::ModuleNotFound { role: Role::Register })
        ));
    }

    #[test]
    fn syscall_table_resolves_every_os_arch_pair() {
        let registry = Registry::with_defaults();
        assert!(registry.setup_syscall_table(Os::Linux, Arch::Arm64).is_ok());
    }
}
