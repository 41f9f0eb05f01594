//! Terminal output for yamlenv
//!
//! Status lines go through `colored`, which honours NO_COLOR, CLICOLOR and CLICOLOR_FORCE.
//! Documents (compiled YAML, settings TOML) are written uncolored to stdout so they can be piped.

use std::fmt::Display;

use colored::Colorize;

/// `error: ...` on stderr
pub fn error(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "error".red().bold(), msg);
}

/// `Warning: ...` on stderr
pub fn warning(msg: &(impl Display + ?Sized)) {
    eprintln!("{}: {}", "Warning".yellow(), msg);
}

pub fn success(msg: &(impl Display + ?Sized)) {
    println!("{} {}", "✓".green(), msg);
}

/// Section title, e.g. the node a key listing belongs to.
pub fn header(msg: &(impl Display + ?Sized)) {
    println!("{}", msg.to_string().cyan().bold());
}

pub fn detail(msg: &(impl Display + ?Sized)) {
    println!("  {}", msg);
}

pub fn info(msg: &(impl Display + ?Sized)) {
    println!("{}", msg);
}

/// Emitted document, newline-terminated exactly once.
pub fn document(text: &str) {
    if text.ends_with('\n') {
        print!("{}", text);
    } else {
        println!("{}", text);
    }
}
