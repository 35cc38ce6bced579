//! Console status lines. Scripts print these for the operator; diagnostics go through `tracing`.

pub fn section(title: &str) {
    println!("\n=== {} ===", title);
}

pub fn pass(message: impl AsRef<str>) {
    println!("  ✅ {}", message.as_ref());
}

pub fn fail(message: impl AsRef<str>) {
    println!("  ❌ {}", message.as_ref());
}

pub fn warn(message: impl AsRef<str>) {
    println!("  ⚠️  {}", message.as_ref());
}

pub fn info(message: impl AsRef<str>) {
    println!("  • {}", message.as_ref());
}

/// Prints a pass or fail line depending on `ok`, and returns `ok`.
pub fn check(ok: bool, message: impl AsRef<str>) -> bool {
    if ok {
        pass(message);
    } else {
        fail(message);
    }
    ok
}
