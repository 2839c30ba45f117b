fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Stamp shown in the startup log line
    let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");
    println!("cargo:rustc-env=BUILD_DATE={}", stamp);
}
