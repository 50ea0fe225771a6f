//! Media classification for `[s]` and `[video]` references, by file
//! extension.

fn extension(name: &str) -> Option<String> {
    let dot = name.rfind('.')?;
    Some(name[dot + 1..].to_ascii_lowercase())
}

pub fn is_name_of_sound(name: &str) -> bool {
    matches!(
        extension(name).as_deref(),
        Some(
            "wav" | "mp3" | "ogg" | "oga" | "opus" | "flac" | "spx" | "m4a" | "aac" | "au"
                | "voc" | "aiff" | "aif" | "wma" | "mid" | "midi"
        )
    )
}

pub fn is_name_of_picture(name: &str) -> bool {
    matches!(
        extension(name).as_deref(),
        Some(
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "svg" | "tif" | "tiff" | "webp" | "ico"
        )
    )
}

pub fn is_name_of_video(name: &str) -> bool {
    matches!(
        extension(name).as_deref(),
        Some("mp4" | "avi" | "mkv" | "webm" | "mov" | "flv" | "wmv" | "3gp" | "mpg" | "mpeg")
    )
}

pub fn is_name_of_svg(name: &str) -> bool {
    extension(name).as_deref() == Some("svg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_by_extension() {
        assert!(is_name_of_sound("bark.wav"));
        assert!(is_name_of_sound("Bark.MP3"));
        assert!(is_name_of_picture("cat.png"));
        assert!(is_name_of_picture("diagram.SVG"));
        assert!(is_name_of_svg("diagram.svg"));
        assert!(is_name_of_video("clip.webm"));
        assert!(!is_name_of_sound("cat.png"));
        assert!(!is_name_of_picture("noext"));
    }
}
