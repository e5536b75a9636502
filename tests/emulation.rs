use p4::{
    asm::assemble,
    emu::{
        interrupts::TIMER,
        io::INTERRUPT_MASK,
        scheduler::{Scheduler, SchedulerConfig, StopReason},
        Emulator,
    },
    plat::{Register, Word},
};

fn load(source: &str) -> (Emulator, p4::asm::AssembleResult) {
    let result = assemble(source);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let emu = Emulator::new(&result.program, &result.data).unwrap();
    (emu, result)
}

const TIMER_PROGRAM: &str = "\
            MVI     R1, 1
            MVIH    R2, FFh
            MVIL    R2, F6h
            STOR    M[R2], R1
            MVIH    R4, 80h
            MVIL    R2, FAh
            STOR    M[R2], R4
            MVIL    R2, F7h
            STOR    M[R2], R1
            ENI
Loop:       BR      Loop
            ORIG    7FF0h
            INC     R3
            RTI
";

fn timer_reaches_handler(config: SchedulerConfig, max_steps: u64) {
    let (mut emu, result) = load(TIMER_PROGRAM);
    let mut scheduler = Scheduler::new(config);
    scheduler.toggle_breakpoint(0x7FF0);
    let reason = scheduler.run(&mut emu, Some(max_steps));
    assert!(matches!(reason, StopReason::Breakpoint(0x7FF0)), "{:?}", reason);
    assert!(!emu.flags.enabled());

    // INC R3, then RTI returns straight to the loop
    emu.clock().unwrap();
    emu.clock().unwrap();
    assert_eq!(emu.registers.read(Register::R3), 1);
    assert!(emu.flags.enabled());
    assert_eq!(Some(emu.pc() as i64), result.label("Loop"));
}

#[test]
fn test_timer_fast() {
    timer_reaches_handler(SchedulerConfig::default(), 500_000_000);
}

#[test]
fn test_timer_slow() {
    timer_reaches_handler(SchedulerConfig::with_rate(2000.0), 20_000);
}

#[test]
fn test_pending_timer_waits_for_its_mask_bit() {
    let (mut emu, _) = load("NOP\nENI\nNOP\nENI\n");
    emu.interrupt_line().raise(TIMER);
    // picked up while interrupts are off
    emu.clock().unwrap();
    assert!(emu.interrupts.pending.contains(&TIMER));
    // ENI with bit 15 clear takes no vector
    emu.clock().unwrap();
    assert!(emu.flags.enabled());
    assert_eq!(emu.pc(), 2);
    emu.clock().unwrap();
    assert_eq!(emu.pc(), 3);
    assert!(emu.interrupts.pending.contains(&TIMER));

    emu.store(INTERRUPT_MASK, 1 << TIMER);
    emu.clock().unwrap();
    assert_eq!(emu.pc(), 0x7FF0);
    assert!(!emu.flags.enabled());
    assert!(emu.interrupts.pending.is_empty());
}

#[test]
fn test_pending_interrupts_by_priority() {
    let source = "\
            MVIH    R1, FFh
            MVIL    R1, FAh
            MVI     R2, 10
            STOR    M[R1], R2
            ENI
            ORIG    7F10h
            RTI
            ORIG    7F30h
            RTI
";
    let (mut emu, _) = load(source);
    emu.press_button(3).unwrap();
    emu.press_button(1).unwrap();
    assert!(emu.press_button(7).is_err());
    for _ in 0..5 {
        emu.clock().unwrap();
    }
    assert_eq!(emu.peek(0xFFFA), 10);
    assert_eq!(emu.pc(), 0x7F10);
    // returning from source 1 picks up source 3
    emu.clock().unwrap();
    assert_eq!(emu.pc(), 0x7F30);
    emu.clock().unwrap();
    assert_eq!(emu.pc(), 5);
    assert!(emu.interrupts.pending.is_empty());
}

#[test]
fn test_terminal_output() {
    let source = "\
            MVIH    R1, FFh
            MVIL    R1, FEh
            MVI     R2, 72
            STOR    M[R1], R2
            MVI     R2, 105
            STOR    M[R1], R2
";
    let (mut emu, _) = load(source);
    let mut scheduler = Scheduler::new(SchedulerConfig::default());
    let reason = scheduler.run(&mut emu, Some(6));
    assert!(matches!(reason, StopReason::StepsExhausted));
    assert_eq!(emu.io.terminal.text(), "Hi");
    assert_eq!(emu.io.terminal.cursor, 2);
}

#[test]
fn test_keyboard_read() {
    let source = "\
            MVIH    R1, FFh
            MVIL    R1, FDh
            LOAD    R2, M[R1]
            MVIL    R1, FFh
            LOAD    R3, M[R1]
            MVIL    R1, FDh
            LOAD    R4, M[R1]
";
    let (mut emu, _) = load(source);
    emu.key_press('a' as Word);
    for _ in 0..7 {
        emu.clock().unwrap();
    }
    assert_eq!(emu.registers.read(Register::R2), 1);
    assert_eq!(emu.registers.read(Register::R3), 'a' as Word);
    assert_eq!(emu.registers.read(Register::R4), 0);
    // the keyboard interrupt stays pending while interrupts are off
    assert!(emu.interrupts.pending.contains(&7));
}
