use colored::Colorize;

// stdout carries only command results so they can be piped.
pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_field(name: &str, value: &str) {
    eprintln!("{}: {}", name.cyan(), value);
}
