#![no_main]

use libfuzzer_sys::fuzz_target;
use oasis_core::types::Image;

fuzz_target!(|data: &[u8]| {
    // 참조 문자열은 &str이므로 UTF-8 변환 필요
    if let Ok(reference) = std::str::from_utf8(data) {
        if let Ok(image) = Image::parse(reference) {
            // 표시 형식은 다시 같은 이미지로 파싱되어야 함
            let reparsed = Image::parse(&image.to_string()).expect("display output must parse");
            assert_eq!(reparsed, image);
        }
    }
});
