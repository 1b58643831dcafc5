fn main() {
    let mut features = vec!["base".to_string()];
    if cfg!(feature = "ocr") {
        features.push("ocr".to_string());
    }
    println!("cargo:rustc-env=PAGESCRIBE_FEATURES={}", features.join(", "));
}
