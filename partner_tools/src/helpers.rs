/// MIME type for an attachment, by file extension. The partners reject uploads without a
/// content type, so unknown extensions go out as octet-stream rather than being dropped.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = filename.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tiff" | "tif" => "image/tiff",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Does a filename look like an attached contract? Managers upload contracts under free-form
/// names; the known spellings plus the partners' fixed names cover what has been seen in
/// production.
pub fn is_contract_filename(filename: &str) -> bool {
    let name = filename.to_lowercase();
    name.contains("contract") || name.contains("договор") || name == "client.pdf" || name == "microinvest.pdf"
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("contract.PDF"), "application/pdf");
        assert_eq!(content_type_for("scan.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("photo.heic"), "image/heic");
        assert_eq!(content_type_for("mystery"), "application/octet-stream");
    }

    #[test]
    fn contract_filenames() {
        assert!(is_contract_filename("Contract_12345.pdf"));
        assert!(is_contract_filename("договор.pdf"));
        assert!(is_contract_filename("client.pdf"));
        assert!(is_contract_filename("microinvest.pdf"));
        assert!(!is_contract_filename("passport.jpg"));
    }
}
