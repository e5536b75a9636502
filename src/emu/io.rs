//! The data bus: flat data memory plus the memory-mapped peripherals at `FF00h`-`FFFFh`.

use crate::plat::{charset, Word, ADDRESS_MASK, MEMORY_WORDS};

use super::timer::Timer;

pub const TERMINAL_READ: Word = 0xFFFF;
pub const TERMINAL_WRITE: Word = 0xFFFE;
pub const TERMINAL_STATE: Word = 0xFFFD;
pub const TERMINAL_CURSOR: Word = 0xFFFC;
pub const TERMINAL_COLOR: Word = 0xFFFB;
pub const INTERRUPT_MASK: Word = 0xFFFA;
pub const SWITCHES: Word = 0xFFF9;
pub const LEDS: Word = 0xFFF8;
pub const TIMER_CONTROL: Word = 0xFFF7;
pub const TIMER_VALUE: Word = 0xFFF6;
pub const LCD_WRITE: Word = 0xFFF5;
pub const LCD_CONTROL: Word = 0xFFF4;
pub const ACCELEROMETER_Z: Word = 0xFFED;
pub const ACCELEROMETER_Y: Word = 0xFFEC;
pub const ACCELEROMETER_X: Word = 0xFFEB;

/// Addresses of the 7-segment displays 0 to 5.
pub const DISPLAYS: [Word; 6] = [0xFFF0, 0xFFF1, 0xFFF2, 0xFFF3, 0xFFEE, 0xFFEF];

/// Whether `addr` falls in the I/O page.
pub fn is_io(addr: Word) -> bool {
    addr >> 8 == 0xFF
}

pub const TERMINAL_COLUMNS: usize = 80;
pub const TERMINAL_LINES: usize = 45;
/// Cells addressable by the cursor; only the first `TERMINAL_LINES * TERMINAL_COLUMNS` are shown.
const TERMINAL_CELLS: usize = 4096;

/// A character written to the terminal, with the colour it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub code: u8,
    pub color: Word,
}

/// Text terminal with keyboard input.
#[derive(Debug, Clone)]
pub struct Terminal {
    pub cells: Vec<Cell>,
    pub cursor: usize,
    /// `background << 8 | foreground`, each RGB 3-3-2.
    pub color: Word,
    pub last_key: Word,
    pub key_ready: bool,
}

impl Default for Terminal {
    fn default() -> Self {
        Self {
            cells: vec![Cell::default(); TERMINAL_CELLS],
            cursor: 0,
            color: 0x00FF,
            last_key: 0,
            key_ready: false,
        }
    }
}

impl Terminal {
    pub fn clear(&mut self) {
        self.cells.fill(Cell::default());
    }

    pub fn write(&mut self, data: Word) {
        self.cells[self.cursor] = Cell {
            code: data as u8,
            color: self.color,
        };
        self.cursor = match self.cursor {
            3599 | 4095 => 0,
            n => n + 1,
        };
    }

    pub fn set_cursor(&mut self, data: Word) {
        if data >> 8 == 0xFF {
            if data & 0xFF == 0xFF {
                self.clear();
            }
        } else {
            let line = (data >> 8 & 63) as usize;
            let col = (data & 127) as usize;
            self.cursor = (line * TERMINAL_COLUMNS + col) & (TERMINAL_CELLS - 1);
        }
    }

    /// Reads the last key, acknowledging it.
    pub fn read(&mut self) -> Word {
        self.key_ready = false;
        self.last_key
    }

    pub fn key_press(&mut self, code: Word) {
        self.last_key = code;
        self.key_ready = true;
    }

    /// The visible screen, one string per line.
    pub fn lines(&self) -> Vec<String> {
        self.cells[..TERMINAL_LINES * TERMINAL_COLUMNS]
            .chunks(TERMINAL_COLUMNS)
            .map(|line| {
                line.iter()
                    .map(|cell| match cell.code {
                        0 => ' ',
                        code => charset::to_char(code),
                    })
                    .collect()
            })
            .collect()
    }

    /// The visible screen with trailing blanks and empty trailing lines removed.
    pub fn text(&self) -> String {
        let lines = self.lines();
        let lines: Vec<&str> = lines.iter().map(|l| l.trim_end()).collect();
        let used = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
        lines[..used].join("\n")
    }
}

pub const LCD_CELLS: usize = 32;

/// The 2x16 character LCD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcd {
    pub cells: [u8; LCD_CELLS],
    pub cursor: usize,
    pub on: bool,
}

impl Default for Lcd {
    fn default() -> Self {
        Self {
            cells: [0; LCD_CELLS],
            cursor: 0,
            on: true,
        }
    }
}

impl Lcd {
    pub fn write(&mut self, data: Word) {
        self.cells[self.cursor] = data as u8;
        self.cursor = (self.cursor + 1) % LCD_CELLS;
    }

    pub fn control(&mut self, data: Word) {
        self.on = data >> 15 == 1;
        if data >> 5 & 1 == 1 {
            self.cells = [0; LCD_CELLS];
        }
        self.cursor = (data & 31) as usize;
    }

    /// Both display lines.
    pub fn lines(&self) -> [String; 2] {
        let line = |cells: &[u8]| {
            cells
                .iter()
                .map(|&c| if c == 0 { ' ' } else { c as char })
                .collect()
        };
        [line(&self.cells[..16]), line(&self.cells[16..])]
    }
}

/// Every device on the data bus, and data memory itself.
pub struct Io {
    pub memory: Box<[Word]>,
    pub terminal: Terminal,
    pub lcd: Lcd,
    /// One bit per LED, 10 LEDs.
    pub leds: Word,
    /// 7-segment latches; each shows its low nibble.
    pub displays: [Word; 6],
    /// One bit per switch, 10 switches.
    pub switches: Word,
    /// X, Y and Z axes.
    pub accelerometer: [Word; 3],
    pub timer: Timer,
}

impl Io {
    pub fn new(data: &[Word], timer: Timer) -> Self {
        let mut memory = vec![0; MEMORY_WORDS].into_boxed_slice();
        memory[..data.len()].copy_from_slice(data);
        Self {
            memory,
            terminal: Terminal::default(),
            lcd: Lcd::default(),
            leds: 0,
            displays: [0; 6],
            switches: 0,
            accelerometer: [0; 3],
            timer,
        }
    }

    /// Reads a word. Reading the terminal key acknowledges it.
    pub fn read(&mut self, addr: Word) -> Word {
        match addr {
            TERMINAL_READ => self.terminal.read(),
            _ => self.peek(addr),
        }
    }

    /// Reads a word without side effects.
    pub fn peek(&self, addr: Word) -> Word {
        if !is_io(addr) {
            return self.memory[(addr & ADDRESS_MASK) as usize];
        }
        match addr {
            TERMINAL_READ => self.terminal.last_key,
            TERMINAL_STATE => self.terminal.key_ready as Word,
            SWITCHES => self.switches,
            ACCELEROMETER_Z => self.accelerometer[2],
            ACCELEROMETER_Y => self.accelerometer[1],
            ACCELEROMETER_X => self.accelerometer[0],
            _ => 0xFFFF,
        }
    }

    pub fn write(&mut self, addr: Word, data: Word) {
        if !is_io(addr) {
            self.memory[(addr & ADDRESS_MASK) as usize] = data;
            return;
        }
        match addr {
            TERMINAL_WRITE => self.terminal.write(data),
            TERMINAL_CURSOR => self.terminal.set_cursor(data),
            TERMINAL_COLOR => self.terminal.color = data,
            LEDS => self.leds = data,
            TIMER_CONTROL if data & 1 == 1 => self.timer.arm(),
            TIMER_CONTROL => self.timer.disarm(),
            TIMER_VALUE => self.timer.tenths = data,
            LCD_WRITE => self.lcd.write(data),
            LCD_CONTROL => self.lcd.control(data),
            _ => {
                if let Some(i) = DISPLAYS.iter().position(|&a| a == addr) {
                    self.displays[i] = data;
                } else {
                    log::trace!("write to unmapped I/O address {:04X}", addr);
                }
            }
        }
    }

    /// Clears every peripheral latch and reloads data memory from `data`.
    pub fn reset(&mut self, data: &[Word]) {
        self.memory.fill(0);
        self.memory[..data.len()].copy_from_slice(data);
        self.terminal = Terminal::default();
        self.lcd = Lcd::default();
        self.leds = 0;
        self.displays = [0; 6];
        self.timer.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_cursor() {
        let mut term = Terminal::default();
        term.set_cursor(2 << 8 | 5);
        assert_eq!(term.cursor, 165);
        term.write(b'A' as Word);
        assert_eq!(term.cells[165].code, b'A');
        assert_eq!(term.cells[165].color, 0x00FF);
        assert_eq!(term.cursor, 166);
        term.set_cursor(0xFFFF);
        assert_eq!(term.cells[165].code, 0);
        // an 0xFF line without the clear code leaves the screen alone
        term.write(b'B' as Word);
        term.set_cursor(0xFF00);
        assert_eq!(term.cursor, 167);
        assert_eq!(term.cells[166].code, b'B');
    }

    #[test]
    fn test_terminal_wraps() {
        let mut term = Terminal::default();
        term.set_cursor(44 << 8 | 79);
        assert_eq!(term.cursor, 3599);
        term.write(b'x' as Word);
        assert_eq!(term.cursor, 0);
        term.set_cursor(63 << 8 | 127);
        assert_eq!(term.cursor, (63 * 80 + 127) & 4095);
    }

    #[test]
    fn test_terminal_text() {
        let mut term = Terminal::default();
        for c in "Hi".bytes() {
            term.write(c as Word);
        }
        term.set_cursor(1 << 8);
        term.write(1);
        assert_eq!(term.text(), "Hi\n☺");
    }

    #[test]
    fn test_lcd() {
        let mut lcd = Lcd::default();
        lcd.control(0x8000 | 31);
        lcd.write(b'a' as Word);
        assert_eq!(lcd.cursor, 0);
        assert!(lcd.on);
        lcd.control(1 << 5);
        assert!(!lcd.on);
        assert_eq!(lcd.cells, [0; LCD_CELLS]);
        lcd.write(b'b' as Word);
        assert_eq!(lcd.lines()[0].trim_end(), "b");
    }

    #[test]
    fn test_address_predicates() {
        assert!(is_io(0xFF00));
        assert!(!is_io(0x7FFF));
        assert!(!is_io(0xFEFF));
    }
}
