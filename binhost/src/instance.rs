//! [`Instance`]: one guest image's fully-wired memory manager, heap, architecture descriptor,
//! and OS personality, plus the panic-catching cancellation wrapper around guest-run entry
//! points.

use std::panic::{self, AssertUnwindSafe};

use binhost_arch::Descriptor;
use binhost_dispatch::Registry;
use binhost_loader::Loaded;
use binhost_memory::{Heap, HostEngine, MemoryManager};
use binhost_os::{AbnormalTermination, OsPersonality};

use crate::Error;

/// Default base address the heap arena is carved out of, above a typical small ELF's load
/// segments.
const DEFAULT_HEAP_BASE: u64 = 0x1000_0000;
/// Default heap arena size: 16 MiB.
const DEFAULT_HEAP_SIZE: u64 = 0x0100_0000;

/// One guest image's resolved components: address space, heap, architecture, and OS
/// personality, plus where execution was placed to begin.
pub struct Instance {
    /// The guest's virtual address space.
    pub mm: MemoryManager<HostEngine>,
    /// The guest's heap arena.
    pub heap: Heap,
    /// The resolved architecture descriptor.
    pub arch: Descriptor,
    /// The resolved OS personality.
    pub os: Box<dyn OsPersonality>,
    /// Where the loader placed the entry point and the base of the loaded image.
    pub loaded: Loaded,
    /// The most recent abnormal termination recorded by [`run_catching`][Self::run_catching], if
    /// any. No partial memory rollback happens when this is set: whatever the guest wrote before
    /// being interrupted stays written.
    pub last_interrupt: Option<AbnormalTermination>,
}

impl Instance {
    /// Sniffs `image`'s architecture and OS, resolves every component through `registry`, and
    /// loads the image's segments into a fresh address space.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sniff`] if the image can't be classified, [`Error::Dispatch`] if the
    /// resolved `(arch, os)` pair has no registered component, or [`Error::Loader`]/
    /// [`Error::Memory`] if placing the image's segments fails.
    pub fn from_image(image: &[u8], registry: &Registry) -> Result<Self, Error> {
        let (arch_tag, os_tag) = binhost_sniff::sniff(image)?;

        let arch = registry.setup_arch(arch_tag)?;
        let os = registry.setup_os(os_tag)?;
        let loader = registry.setup_loader(os_tag)?;

        let mut mm = MemoryManager::new(arch.archbit, HostEngine::new());
        let loaded = loader.load(image, &mut mm)?;
        let heap = Heap::new(DEFAULT_HEAP_BASE, DEFAULT_HEAP_BASE + DEFAULT_HEAP_SIZE);

        Ok(Self {
            mm,
            heap,
            arch,
            os,
            loaded,
            last_interrupt: None,
        })
    }

    /// Runs `body` (a guest-execution step), catching any panic the underlying emulator engine
    /// raises rather than letting it unwind past this call.
    ///
    /// On a caught panic, `pc` is recorded as the point execution stopped at: the OS personality
    /// is informed via [`OsPersonality::on_abnormal_termination`] and the same event is stashed
    /// on [`last_interrupt`][Self::last_interrupt] for the host loop to inspect afterward. This
    /// is the direct analogue of a host-side keyboard-interrupt wrapper: it stops the engine and
    /// records the interruption, but performs no memory rollback.
    ///
    /// Returns `Some(R)` if `body` completed normally, `None` if it panicked.
    pub fn run_catching<R>(&mut self, pc: u64, body: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(value) => Some(value),
            Err(_) => {
                let event = AbnormalTermination { pc };
                self.os.on_abnormal_termination(event);
                self.last_interrupt = Some(event);
                tracing::warn!(pc = format_args!("{pc:#x}"), "guest run interrupted");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_elf64_one_load_segment() -> Vec<u8> {
        let mut buf = vec![0u8; 0x2000];
        buf[0..4].copy_from_slice(&binhost_elf::ElfIdent::MAGIC_BYTES);
        buf[4] = binhost_elf::Class::CLASS64.0;
        buf[5] = binhost_elf::Encoding::LSB2.0;
        buf[7] = binhost_elf::OsAbi::LINUX.0;
        buf[0x12..0x14].copy_from_slice(&binhost_elf::Machine::X86_64.0.to_le_bytes());
        buf[0x18..0x20].copy_from_slice(&0x401000u64.to_le_bytes());
        buf[0x20..0x28].copy_from_slice(&64u64.to_le_bytes());
        buf[0x36..0x38].copy_from_slice(&56u16.to_le_bytes());
        buf[0x38..0x3A].copy_from_slice(&1u16.to_le_bytes());

        let ph = 64;
        buf[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes());
        buf[ph + 4..ph + 8].copy_from_slice(&5u32.to_le_bytes());
        buf[ph + 16..ph + 24].copy_from_slice(&0x401000u64.to_le_bytes());
        buf[ph + 32..ph + 40].copy_from_slice(&0x1000u64.to_le_bytes());
        buf[ph + 40..ph + 48].copy_from_slice(&0x1000u64.to_le_bytes());
        buf
    }

    #[test]
    fn from_image_resolves_and_loads_an_x86_64_linux_elf() {
        let registry = Registry::with_defaults();
        let image = minimal_elf64_one_load_segment();

        let instance = Instance::from_image(&image, &registry).unwrap();
        assert_eq!(instance.arch.arch, binhost_arch::Arch::X8664);
        assert_eq!(instance.os.os(), binhost_os::Os::Linux);
        assert_eq!(instance.loaded.entry_point, 0x401000);
        assert!(instance.mm.is_mapped(0x401000, 0x1000));
    }

    #[test]
    fn run_catching_records_interrupt_without_propagating_the_panic() {
        let registry = Registry::with_defaults();
        let image = minimal_elf64_one_load_segment();
        let mut instance = Instance::from_image(&image, &registry).unwrap();

        assert!(instance.last_interrupt.is_none());
        let result = instance.run_catching(0x401000, || panic!("engine fault"));
        assert!(result.is_none());
        assert_eq!(instance.last_interrupt, Some(AbnormalTermination { pc: 0x401000 }));
    }
}
