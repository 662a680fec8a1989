#![allow(unused_macros, dead_code)]
macro_rules! verbose_println {
    ($($p:expr),+) => {
        if (config::ARGS.verbose) {
            println!($($p),+);
        }
    }
}
macro_rules! info {
    ($($p:expr),+) => {
        println!(concat!(blue!("INFO"),": {}"),format_args!($($p),+))
    }
}

macro_rules! warn {
    ($($p:expr),+) => {
        println!(concat!(red!("WARNING"),": {}"),format_args!($($p),+))
    }
}
macro_rules! general_err {
    ($msg:expr) => {
        crate::Error::new(crate::ErrorKind::General, None, format!("{}", $msg).as_str())
    };
}
// assembly error carrying a source position
macro_rules! asm_err {
    ($kind:expr, $pos:expr, $($msg:expr),+) => {
        crate::Error::new($kind, Some($pos), format!($($msg),+).as_str())
    };
}
macro_rules! syntax_err {
    ($pos:expr, $($msg:expr),+) => {
        crate::Error::new(crate::ErrorKind::Syntax, Some($pos), format!($($msg),+).as_str())
    };
}
macro_rules! lex_err {
    ($pos:expr, $($msg:expr),+) => {
        crate::Error::new(crate::ErrorKind::Lex, Some($pos), format!($($msg),+).as_str())
    };
}
macro_rules! runtime_err {
    ($($msg:expr),+) => {
        crate::Error::new(
            crate::ErrorKind::Runtime,
            None,
            format!("{} {}", red!("Runtime Error"), format_args!($($msg),+)).as_str(),
        )
    };
}
macro_rules! xor {
    ($a: expr, $b: expr) => {
        ((($a) && !($b)) || (!($a) && ($b)))
    };
}
macro_rules! color {
    ($color: literal, $msg: expr) => {
        concat!("\x1b[", $color, "m", $msg, "\x1b[0m")
    };
}
macro_rules! red {
    ($msg:expr) => {
        color!(91, $msg)
    };
}
macro_rules! green {
    ($msg:expr) => {
        color!(92, $msg)
    };
}
macro_rules! yellow {
    ($msg:expr) => {
        color!(93, $msg)
    };
}
macro_rules! blue {
    ($msg:expr) => {
        color!(94, $msg)
    };
}
