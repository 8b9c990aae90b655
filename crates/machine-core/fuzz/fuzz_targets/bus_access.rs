#![no_main]

use machine_core::{
    AccessFlags, AccessIntent, AccessWidth, BusAccess, CardRegion, CpuPersonality, DeviceId,
    DeviceTarget, EventContext, EventKind, EventSpec, Machine, MachineConfig, Peripheral,
    Permissions, Ram, RegionTag, Rom, ScheduledEvent, SignalLine,
};
use libfuzzer_sys::fuzz_target;

struct Card {
    rom: Rom,
    expansion: Rom,
}

impl Peripheral for Card {
    fn name(&self) -> &str {
        "fuzz-card"
    }

    fn region_mut(&mut self, region: CardRegion) -> Option<&mut dyn DeviceTarget> {
        match region {
            CardRegion::Rom => Some(&mut self.rom),
            CardRegion::ExpansionRom => Some(&mut self.expansion),
            CardRegion::Io => None,
        }
    }

    fn region(&self, region: CardRegion) -> Option<&dyn DeviceTarget> {
        match region {
            CardRegion::Rom => Some(&self.rom),
            CardRegion::ExpansionRom => Some(&self.expansion),
            CardRegion::Io => None,
        }
    }
}

fn machine(selector: u8) -> Machine {
    let personality = match selector % 3 {
        0 => CpuPersonality::Legacy8,
        1 => CpuPersonality::Native16,
        _ => CpuPersonality::Native32,
    };
    let mut machine = Machine::new(MachineConfig::for_personality(personality)).expect("valid");
    let bus = machine.bus_mut();
    let ram = bus.add_target(Box::new(Ram::new(0x8000)));
    let rom = bus.add_target(Box::new(Rom::new(vec![0xEA; 0x1000])));
    if let (Ok(ram), Ok(rom)) = (
        bus.page_entry(ram, DeviceId(1), RegionTag::Ram, Permissions::RW),
        bus.page_entry(rom, DeviceId(2), RegionTag::Rom, Permissions::RX),
    ) {
        let _ = bus.map_page(0, ram);
        let _ = bus.map_page(1, rom);
    }
    let _ = machine.install_io_page(|page| page);
    let _ = machine.install_card(
        6,
        Box::new(Card {
            rom: Rom::new(vec![0x60; 0x100]),
            expansion: Rom::new(vec![0x9F; 0x800]),
        }),
    );
    machine
}

fn toggle_irq(event: &ScheduledEvent, context: &mut EventContext<'_>) {
    let device = DeviceId((event.tag & 0x7) as u16);
    if event.tag & 0x8 == 0 {
        context.signals.assert(SignalLine::Irq, device);
    } else {
        context.signals.deassert(SignalLine::Irq, device);
    }
    assert!(context.scheduler.now() >= event.due_cycle);
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, ops)) = data.split_first() else {
        return;
    };
    let mut machine = machine(selector);
    let base = machine.io_window().map_or(0, |window| window.base);
    let Ok(handler) = machine.register_handler(Box::new(toggle_irq)) else {
        return;
    };
    let mut handles = Vec::new();

    for op in ops.chunks_exact(8) {
        let width = match op[0] & 0x3 {
            0 | 3 => AccessWidth::Byte,
            1 => AccessWidth::Word,
            _ => AccessWidth::Dword,
        };
        let intent = AccessIntent::ALL[usize::from(op[1]) % AccessIntent::ALL.len()];
        let raw = u32::from_le_bytes([op[2], op[3], op[4], op[5]]);
        let address = if op[0] & 0x80 != 0 {
            base.wrapping_add(raw & 0x0FFF)
        } else {
            raw
        };
        let value = u32::from(op[6]) * 0x0101_0101;
        let access = if intent.is_write() {
            BusAccess::write(address, width, value, intent)
        } else {
            BusAccess::read(address, width, intent)
        }
        .with_flags(AccessFlags::from_bits_truncate(op[7]));

        let before = machine.slots().borrow().selection();
        match machine.cpu_access(&access) {
            Ok(outcome) => assert_eq!(outcome.value & !width.value_mask(), 0),
            Err(fault) => assert!(fault.cycles <= width.bytes()),
        }
        if !access.side_effects_allowed() {
            assert_eq!(machine.slots().borrow().selection(), before);
        }
        if op[0] & 0x40 != 0 {
            let spec = EventSpec::new(handler, EventKind::DeviceTimer).with_tag(u32::from(op[7]));
            handles.push(machine.scheduler_mut().schedule_after(u64::from(op[6]), spec));
        }
        if op[0] & 0x20 != 0 {
            if let Some(handle) = handles.pop() {
                let pending = machine.scheduler().is_pending(handle);
                assert_eq!(machine.scheduler_mut().cancel(handle), pending);
            }
        }
        let before_now = machine.scheduler().now();
        machine.end_step(u64::from(op[0] & 0x3));
        assert_eq!(machine.scheduler().now(), before_now + u64::from(op[0] & 0x3));
        if let Some(due) = machine.scheduler().peek_next_due() {
            assert!(due > machine.scheduler().now());
        }
    }
    machine.idle_until_next_event();
});
