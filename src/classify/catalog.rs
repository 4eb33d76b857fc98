//! The API recognition catalogue: a frozen table mapping NT kernel and
//! HAL import names to semantic categories. Hardware-band entries carry
//! the name of the equivalent Forth word; scaffolding-band entries carry
//! none, because scaffolding is discarded rather than translated.

use super::Category;

/// One recognized kernel API.
#[derive(Debug, Clone, Copy)]
pub struct ApiEntry {
    pub name: &'static str,
    pub category: Category,
    /// The equivalent word in the target runtime, verbatim
    pub word: Option<&'static str>,
}

const fn hw(name: &'static str, category: Category, word: &'static str) -> ApiEntry {
    ApiEntry {
        name,
        category,
        word: Some(word),
    }
}

const fn sc(name: &'static str, category: Category) -> ApiEntry {
    ApiEntry {
        name,
        category,
        word: None,
    }
}

pub static API_CATALOG: &[ApiEntry] = &[
    // port I/O
    hw("READ_PORT_UCHAR", Category::PortIo, "C@-PORT"),
    hw("READ_PORT_USHORT", Category::PortIo, "W@-PORT"),
    hw("READ_PORT_ULONG", Category::PortIo, "@-PORT"),
    hw("WRITE_PORT_UCHAR", Category::PortIo, "C!-PORT"),
    hw("WRITE_PORT_USHORT", Category::PortIo, "W!-PORT"),
    hw("WRITE_PORT_ULONG", Category::PortIo, "!-PORT"),
    hw("READ_PORT_BUFFER_UCHAR", Category::PortIo, "C@-PORT-BUF"),
    hw("READ_PORT_BUFFER_USHORT", Category::PortIo, "W@-PORT-BUF"),
    hw("READ_PORT_BUFFER_ULONG", Category::PortIo, "@-PORT-BUF"),
    hw("WRITE_PORT_BUFFER_UCHAR", Category::PortIo, "C!-PORT-BUF"),
    hw("WRITE_PORT_BUFFER_USHORT", Category::PortIo, "W!-PORT-BUF"),
    hw("WRITE_PORT_BUFFER_ULONG", Category::PortIo, "!-PORT-BUF"),
    // memory-mapped register access
    hw("READ_REGISTER_UCHAR", Category::Mmio, "C@-MMIO"),
    hw("READ_REGISTER_USHORT", Category::Mmio, "W@-MMIO"),
    hw("READ_REGISTER_ULONG", Category::Mmio, "@-MMIO"),
    hw("WRITE_REGISTER_UCHAR", Category::Mmio, "C!-MMIO"),
    hw("WRITE_REGISTER_USHORT", Category::Mmio, "W!-MMIO"),
    hw("WRITE_REGISTER_ULONG", Category::Mmio, "!-MMIO"),
    hw("READ_REGISTER_BUFFER_UCHAR", Category::Mmio, "C@-MMIO-BUF"),
    hw("READ_REGISTER_BUFFER_USHORT", Category::Mmio, "W@-MMIO-BUF"),
    hw("READ_REGISTER_BUFFER_ULONG", Category::Mmio, "@-MMIO-BUF"),
    hw("WRITE_REGISTER_BUFFER_UCHAR", Category::Mmio, "C!-MMIO-BUF"),
    hw("WRITE_REGISTER_BUFFER_USHORT", Category::Mmio, "W!-MMIO-BUF"),
    hw("WRITE_REGISTER_BUFFER_ULONG", Category::Mmio, "!-MMIO-BUF"),
    hw("MmMapIoSpace", Category::Mmio, "MAP-MMIO"),
    hw("MmUnmapIoSpace", Category::Mmio, "UNMAP-MMIO"),
    // DMA setup
    hw("IoGetDmaAdapter", Category::Dma, "DMA-ADAPTER"),
    hw("IoAllocateAdapterChannel", Category::Dma, "DMA-CHANNEL"),
    hw("IoFreeAdapterChannel", Category::Dma, "DMA-CHANNEL-FREE"),
    hw("IoMapTransfer", Category::Dma, "DMA-MAP"),
    hw("IoFlushAdapterBuffers", Category::Dma, "DMA-FLUSH"),
    hw("IoFreeMapRegisters", Category::Dma, "DMA-REGS-FREE"),
    hw("HalAllocateCommonBuffer", Category::Dma, "DMA-BUFFER"),
    hw("HalFreeCommonBuffer", Category::Dma, "DMA-BUFFER-FREE"),
    // interrupt plumbing
    hw("IoConnectInterrupt", Category::Interrupt, "IRQ-CONNECT"),
    hw("IoDisconnectInterrupt", Category::Interrupt, "IRQ-DISCONNECT"),
    hw("KeSynchronizeExecution", Category::Interrupt, "IRQ-SYNC"),
    hw("HalEnableSystemInterrupt", Category::Interrupt, "IRQ-ENABLE"),
    hw("HalDisableSystemInterrupt", Category::Interrupt, "IRQ-DISABLE"),
    hw("KeAcquireInterruptSpinLock", Category::Interrupt, "IRQ-LOCK"),
    hw("KeReleaseInterruptSpinLock", Category::Interrupt, "IRQ-UNLOCK"),
    // busy-wait timing
    hw("KeStallExecutionProcessor", Category::Timing, "US-DELAY"),
    hw("KeDelayExecutionThread", Category::Timing, "MS-DELAY"),
    hw("KeQueryPerformanceCounter", Category::Timing, "TIMESTAMP"),
    hw("KeQueryTickCount", Category::Timing, "TICKS"),
    hw("KeQuerySystemTime", Category::Timing, "NOW"),
    // PCI configuration space
    hw("HalGetBusData", Category::PciConfig, "PCI-READ"),
    hw("HalGetBusDataByOffset", Category::PciConfig, "PCI-READ"),
    hw("HalSetBusData", Category::PciConfig, "PCI-WRITE"),
    hw("HalSetBusDataByOffset", Category::PciConfig, "PCI-WRITE"),
    hw("HalTranslateBusAddress", Category::PciConfig, "BUS>PHYS"),
    hw("HalAssignSlotResources", Category::PciConfig, "PCI-ASSIGN"),
    // I/O request packets
    sc("IoCompleteRequest", Category::Irp),
    sc("IofCompleteRequest", Category::Irp),
    sc("IoCreateDevice", Category::Irp),
    sc("IoDeleteDevice", Category::Irp),
    sc("IoCreateSymbolicLink", Category::Irp),
    sc("IoDeleteSymbolicLink", Category::Irp),
    sc("IoStartPacket", Category::Irp),
    sc("IoStartNextPacket", Category::Irp),
    sc("IoBuildDeviceIoControlRequest", Category::Irp),
    sc("IoCallDriver", Category::Irp),
    sc("IofCallDriver", Category::Irp),
    sc("IoMarkIrpPending", Category::Irp),
    // plug-and-play
    sc("IoAttachDeviceToDeviceStack", Category::Pnp),
    sc("IoDetachDevice", Category::Pnp),
    sc("IoInvalidateDeviceRelations", Category::Pnp),
    sc("IoRegisterDeviceInterface", Category::Pnp),
    sc("IoSetDeviceInterfaceState", Category::Pnp),
    sc("IoGetDeviceProperty", Category::Pnp),
    // power management
    sc("PoSetPowerState", Category::Power),
    sc("PoRequestPowerIrp", Category::Power),
    sc("PoStartNextPowerIrp", Category::Power),
    sc("PoCallDriver", Category::Power),
    sc("PoRegisterDeviceForIdleDetection", Category::Power),
    // memory manager
    sc("ExAllocatePool", Category::MemoryManager),
    sc("ExAllocatePoolWithTag", Category::MemoryManager),
    sc("ExFreePool", Category::MemoryManager),
    sc("ExFreePoolWithTag", Category::MemoryManager),
    sc("MmAllocateContiguousMemory", Category::MemoryManager),
    sc("MmFreeContiguousMemory", Category::MemoryManager),
    sc("MmAllocateNonCachedMemory", Category::MemoryManager),
    sc("MmFreeNonCachedMemory", Category::MemoryManager),
    sc("MmGetPhysicalAddress", Category::MemoryManager),
    sc("MmProbeAndLockPages", Category::MemoryManager),
    // synchronization
    sc("KeInitializeSpinLock", Category::Synchronization),
    sc("KeAcquireSpinLock", Category::Synchronization),
    sc("KeReleaseSpinLock", Category::Synchronization),
    sc("KfAcquireSpinLock", Category::Synchronization),
    sc("KfReleaseSpinLock", Category::Synchronization),
    sc("KeAcquireSpinLockAtDpcLevel", Category::Synchronization),
    sc("KeReleaseSpinLockFromDpcLevel", Category::Synchronization),
    sc("KeInitializeEvent", Category::Synchronization),
    sc("KeSetEvent", Category::Synchronization),
    sc("KeResetEvent", Category::Synchronization),
    sc("KeWaitForSingleObject", Category::Synchronization),
    sc("KeInitializeDpc", Category::Synchronization),
    sc("KeInsertQueueDpc", Category::Synchronization),
    sc("KeInitializeTimer", Category::Synchronization),
    sc("KeSetTimer", Category::Synchronization),
    sc("KeCancelTimer", Category::Synchronization),
    // registry
    sc("RtlQueryRegistryValues", Category::Registry),
    sc("RtlWriteRegistryValue", Category::Registry),
    sc("RtlDeleteRegistryValue", Category::Registry),
    sc("ZwOpenKey", Category::Registry),
    sc("ZwCreateKey", Category::Registry),
    sc("ZwQueryValueKey", Category::Registry),
    sc("ZwSetValueKey", Category::Registry),
    sc("ZwClose", Category::Registry),
    // string handling
    sc("RtlInitUnicodeString", Category::String),
    sc("RtlCopyUnicodeString", Category::String),
    sc("RtlAppendUnicodeStringToString", Category::String),
    sc("RtlCompareUnicodeString", Category::String),
    sc("RtlAnsiStringToUnicodeString", Category::String),
    sc("RtlUnicodeStringToAnsiString", Category::String),
    sc("RtlFreeUnicodeString", Category::String),
    sc("RtlIntegerToUnicodeString", Category::String),
    // WMI
    sc("IoWMIRegistrationControl", Category::Wmi),
    sc("WmiCompleteRequest", Category::Wmi),
    sc("WmiSystemControl", Category::Wmi),
    sc("IoWMIWriteEvent", Category::Wmi),
];

/// Linear lookup by exact import name.
pub fn lookup(name: &str) -> Option<&'static ApiEntry> {
    API_CATALOG.iter().find(|entry| entry.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_entries_always_carry_a_word() {
        for entry in API_CATALOG {
            if entry.category.is_hardware() {
                assert!(
                    entry.word.is_some(),
                    "{} is hardware-band but has no word",
                    entry.name
                );
            } else {
                assert!(
                    entry.word.is_none(),
                    "{} is scaffolding-band but carries a word",
                    entry.name
                );
            }
        }
    }

    #[test]
    fn every_entry_is_banded() {
        for entry in API_CATALOG {
            assert!(
                entry.category.is_hardware() || entry.category.is_scaffolding(),
                "{} has a bandless category",
                entry.name
            );
        }
    }

    #[test]
    fn lookup_is_exact() {
        assert!(lookup("READ_PORT_UCHAR").is_some());
        assert!(lookup("read_port_uchar").is_none());
        assert!(lookup("DbgPrint").is_none());
    }
}
