use crate::error::{BinderError, Result};
use enigo::{Direction, Enigo, Key as EnigoKey, Keyboard, Settings};
use rdev::{self, EventType, Key};

/// A key event as seen by the hook, reduced to what matching needs.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Press { key: Key, name: Option<String> },
    Release { key: Key },
}

impl InputEvent {
    pub fn press(key: Key, name: Option<&str>) -> Self {
        InputEvent::Press {
            key,
            name: name.map(str::to_string),
        }
    }

    pub fn release(key: Key) -> Self {
        InputEvent::Release { key }
    }

    /// Convert an rdev event; mouse and wheel events map to `None`.
    pub fn from_rdev(event: &rdev::Event) -> Option<Self> {
        match event.event_type {
            EventType::KeyPress(key) => Some(InputEvent::Press {
                key,
                name: event.name.clone(),
            }),
            EventType::KeyRelease(key) => Some(InputEvent::Release { key }),
            _ => None,
        }
    }

    pub fn key(&self) -> Key {
        match self {
            InputEvent::Press { key, .. } | InputEvent::Release { key } => *key,
        }
    }
}

/// How a completed keystroke affects the typed-text buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    /// Space, enter or tab: recorded as a single space.
    Submit,
    Backspace,
    Ignored,
}

pub fn classify_key(key: Key, name: Option<&str>) -> KeyInput {
    match key {
        Key::Space | Key::Return | Key::KpReturn | Key::Tab => KeyInput::Submit,
        Key::Backspace => KeyInput::Backspace,
        _ => match name.and_then(rdev_name_to_char) {
            Some(c) => KeyInput::Char(c),
            None => KeyInput::Ignored,
        },
    }
}

/// The printable character an rdev key name stands for, if it is exactly one.
pub fn rdev_name_to_char(name: &str) -> Option<char> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Some(c),
        _ => None,
    }
}

/// Left and right variants of a modifier count as the same key.
pub fn normalize_key(key: Key) -> Key {
    match key {
        Key::ControlRight => Key::ControlLeft,
        Key::ShiftRight => Key::ShiftLeft,
        Key::MetaRight => Key::MetaLeft,
        Key::AltGr => Key::Alt,
        other => other,
    }
}

/// A parsed key combination such as `ctrl+shift+a` or `F10+1`.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCombo {
    keys: Vec<Key>,
    source: String,
}

impl KeyCombo {
    pub fn parse(pattern: &str) -> Result<Self> {
        let source = pattern.trim();
        if source.is_empty() {
            return Err(BinderError::registration(pattern, "empty combination"));
        }

        let mut keys: Vec<Key> = Vec::new();
        for token in source.split('+') {
            let token = token.trim();
            if token.is_empty() {
                return Err(BinderError::registration(pattern, "empty key in combination"));
            }
            let key = parse_key_name(token)
                .ok_or_else(|| BinderError::registration(pattern, format!("unknown key '{}'", token)))?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        Ok(Self {
            keys,
            source: source.to_string(),
        })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn contains(&self, key: Key) -> bool {
        self.keys.contains(&normalize_key(key))
    }

    /// True when exactly this combination's keys are held, in any order.
    pub fn matches_held(&self, held: &[Key]) -> bool {
        held.len() == self.keys.len() && self.keys.iter().all(|k| held.contains(k))
    }

    pub fn is_strict_subset_of(&self, other: &KeyCombo) -> bool {
        self.keys.len() < other.keys.len() && self.keys.iter().all(|k| other.keys.contains(k))
    }
}

fn parse_key_name(token: &str) -> Option<Key> {
    let lower = token.to_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" => Key::ControlLeft,
        "shift" => Key::ShiftLeft,
        "alt" | "option" => Key::Alt,
        "win" | "windows" | "cmd" | "command" | "meta" | "super" => Key::MetaLeft,
        "space" => Key::Space,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "insert" | "ins" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page up" => Key::PageUp,
        "pagedown" | "page down" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "capslock" | "caps lock" => Key::CapsLock,
        "printscreen" | "print screen" => Key::PrintScreen,
        "scrolllock" | "scroll lock" => Key::ScrollLock,
        "pause" => Key::Pause,
        "numlock" | "num lock" => Key::NumLock,
        "-" | "minus" => Key::Minus,
        "=" | "equal" => Key::Equal,
        "," | "comma" => Key::Comma,
        "." | "dot" | "period" => Key::Dot,
        "/" | "slash" => Key::Slash,
        "\\" | "backslash" => Key::BackSlash,
        ";" | "semicolon" => Key::SemiColon,
        "'" | "quote" => Key::Quote,
        "`" | "backquote" => Key::BackQuote,
        "[" => Key::LeftBracket,
        "]" => Key::RightBracket,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        single if single.chars().count() == 1 => return single.chars().next().and_then(char_key),
        _ => return None,
    };
    Some(key)
}

fn char_key(c: char) -> Option<Key> {
    let key = match c {
        '0' => Key::Num0,
        '1' => Key::Num1,
        '2' => Key::Num2,
        '3' => Key::Num3,
        '4' => Key::Num4,
        '5' => Key::Num5,
        '6' => Key::Num6,
        '7' => Key::Num7,
        '8' => Key::Num8,
        '9' => Key::Num9,
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        _ => return None,
    };
    Some(key)
}

/// Create a keyboard controller
pub fn create_keyboard_controller() -> Result<Enigo> {
    let settings = Settings::default();
    Enigo::new(&settings).map_err(|err| {
        BinderError::Enigo(format!("Failed to create keyboard controller: {}", err))
    })
}

/// Send backspace key presses
pub fn send_backspace(keyboard: &mut impl Keyboard, count: usize) -> Result<()> {
    for _ in 0..count {
        keyboard
            .key(EnigoKey::Backspace, Direction::Click)
            .map_err(|err| BinderError::Enigo(format!("Failed to send backspace: {}", err)))?;
    }
    Ok(())
}

/// Send the platform paste shortcut (Cmd+V on macOS, Ctrl+V elsewhere).
pub fn send_paste_shortcut(keyboard: &mut impl Keyboard) -> Result<()> {
    #[cfg(target_os = "macos")]
    let modifier = EnigoKey::Meta;
    #[cfg(not(target_os = "macos"))]
    let modifier = EnigoKey::Control;

    let to_err = |err: enigo::InputError| BinderError::Enigo(format!("Failed to paste: {}", err));

    keyboard.key(modifier, Direction::Press).map_err(to_err)?;
    let clicked = keyboard.key(EnigoKey::Unicode('v'), Direction::Click);
    // Always let go of the modifier, even when the click failed.
    let released = keyboard.key(modifier, Direction::Release);
    clicked.map_err(to_err)?;
    released.map_err(to_err)
}
