//! PRONOM format and signature records.
//!
//! Expressions follow the published PRONOM signatures, trimmed to the
//! distinguishing parts.

use crate::signature::{
    ContainerFileSource, ContainerSignatureSource, Format, SignatureFile, SignatureSource,
};
use formatid_core::ContainerKind;

/// Load the builtin PRONOM records into a signature file.
pub fn load_pronom(file: &mut SignatureFile) {
    // Archives the engine can open
    add_archive_formats(file);

    // Images
    add_image_formats(file);

    // Documents
    add_document_formats(file);

    // Office packages identified by container signatures
    add_container_formats(file);
}

fn add_archive_formats(file: &mut SignatureFile) {
    file.add_format(
        Format::new("x-fmt/263", "ZIP Format")
            .with_mime_type("application/zip")
            .with_extension("zip")
            .with_signature(200),
    );
    // Local file header
    file.add_signature(SignatureSource::new(200).with_name("ZIP local header").bof("504B0304"));
    file.add_container_trigger("x-fmt/263", ContainerKind::Zip);

    file.add_format(
        Format::new("x-fmt/266", "GZIP Format")
            .with_mime_type("application/gzip")
            .with_extension("gz")
            .with_extension("tgz")
            .with_signature(201),
    );
    // Magic plus deflate method
    file.add_signature(SignatureSource::new(201).bof("1F8B08"));

    file.add_format(
        Format::new("x-fmt/265", "Tape Archive Format")
            .with_mime_type("application/x-tar")
            .with_extension("tar")
            .with_signature(202),
    );
    // POSIX ustar magic in the first header block
    file.add_signature(SignatureSource::new(202).bof("{257} 'ustar' (00 '00'|'  ' 00)"));

    file.add_format(
        Format::new("fmt/411", "RAR Archive")
            .with_version("4")
            .with_mime_type("application/vnd.rar")
            .with_extension("rar")
            .with_signature(203),
    );
    file.add_signature(SignatureSource::new(203).bof("'Rar!' 1A 07 00"));

    file.add_format(
        Format::new("fmt/613", "RAR Archive")
            .with_version("5")
            .with_mime_type("application/vnd.rar")
            .with_extension("rar")
            .with_signature(204),
    );
    file.add_signature(SignatureSource::new(204).bof("'Rar!' 1A 07 01 00"));

    file.add_format(
        Format::new("fmt/468", "ISO Disk Image File System")
            .with_mime_type("application/x-iso9660-image")
            .with_extension("iso")
            .with_signature(205),
    );
    // Primary volume descriptor at sector 16
    file.add_signature(SignatureSource::new(205).bof("{32768} 01 'CD001' 01"));
}

fn add_image_formats(file: &mut SignatureFile) {
    file.add_format(
        Format::new("fmt/13", "Portable Network Graphics")
            .with_version("1.2")
            .with_mime_type("image/png")
            .with_extension("png")
            .with_signature(300),
    );
    file.add_signature(
        SignatureSource::new(300)
            .bof("89 'PNG' 0D0A1A0A 0000000D 'IHDR'")
            .eof("0000000049454E44AE426082"),
    );

    file.add_format(
        Format::new("fmt/3", "Graphics Interchange Format")
            .with_version("87a")
            .with_mime_type("image/gif")
            .with_extension("gif")
            .with_signature(301),
    );
    file.add_signature(SignatureSource::new(301).bof("'GIF87a'"));

    file.add_format(
        Format::new("fmt/4", "Graphics Interchange Format")
            .with_version("89a")
            .with_mime_type("image/gif")
            .with_extension("gif")
            .with_signature(302),
    );
    file.add_signature(SignatureSource::new(302).bof("'GIF89a'").eof("00 3B"));

    file.add_format(
        Format::new("fmt/41", "Raw JPEG Stream")
            .with_mime_type("image/jpeg")
            .with_extension("jpg")
            .with_extension("jpeg")
            .with_signature(303),
    );
    file.add_signature(SignatureSource::new(303).bof("FFD8FF"));

    file.add_format(
        Format::new("fmt/43", "JPEG File Interchange Format")
            .with_version("1.01")
            .with_mime_type("image/jpeg")
            .with_extension("jpg")
            .with_extension("jpeg")
            .with_signature(304)
            .with_priority_over("fmt/41"),
    );
    file.add_signature(
        SignatureSource::new(304)
            .bof("FFD8FFE0 {2} 'JFIF' 00 0101")
            .eof("FFD9"),
    );
}

fn add_document_formats(file: &mut SignatureFile) {
    file.add_format(
        Format::new("fmt/18", "Acrobat PDF 1.4 - Portable Document Format")
            .with_version("1.4")
            .with_mime_type("application/pdf")
            .with_extension("pdf")
            .with_signature(400),
    );
    file.add_signature(
        SignatureSource::new(400)
            .bof("'%PDF-1.4'")
            .eof("'%%EOF' {0-2}"),
    );

    file.add_format(
        Format::new("fmt/276", "Acrobat PDF 1.7 - Portable Document Format")
            .with_version("1.7")
            .with_mime_type("application/pdf")
            .with_extension("pdf")
            .with_signature(401),
    );
    file.add_signature(
        SignatureSource::new(401)
            .bof("'%PDF-1.7'")
            .eof("'%%EOF' {0-2}"),
    );

    file.add_format(
        Format::new("fmt/101", "Extensible Markup Language")
            .with_version("1.0")
            .with_mime_type("text/xml")
            .with_extension("xml")
            .with_signature(402),
    );
    file.add_signature(
        SignatureSource::new(402).bof("{0-3} '<?xml version=' [2227] '1.0' [2227]"),
    );

    file.add_format(
        Format::new("fmt/96", "Hypertext Markup Language")
            .with_mime_type("text/html")
            .with_extension("html")
            .with_extension("htm")
            .with_signature(403),
    );
    file.add_signature(
        SignatureSource::new(403).bof("{0-1024} '<' ['Hh'] ['Tt'] ['Mm'] ['Ll'] [090A0D20'>']"),
    );

    // Extension only
    file.add_format(
        Format::new("x-fmt/111", "Plain Text File")
            .with_mime_type("text/plain")
            .with_extension("txt"),
    );
}

fn add_container_formats(file: &mut SignatureFile) {
    file.add_format(
        Format::new("fmt/412", "Microsoft Word for Windows")
            .with_version("2007 onwards")
            .with_mime_type(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            )
            .with_extension("docx"),
    );
    file.add_container_signature(
        ContainerSignatureSource::new(1000, "fmt/412", ContainerKind::Zip)
            .with_file(ContainerFileSource::present("[Content_Types].xml"))
            .with_file(ContainerFileSource::present("word/document.xml")),
    );

    file.add_format(
        Format::new("fmt/291", "OpenDocument Text")
            .with_version("1.2")
            .with_mime_type("application/vnd.oasis.opendocument.text")
            .with_extension("odt"),
    );
    file.add_container_signature(
        ContainerSignatureSource::new(1010, "fmt/291", ContainerKind::Zip)
            .with_file(
                ContainerFileSource::present("mimetype").with_signature(
                    SignatureSource::new(1).bof("'application/vnd.oasis.opendocument.text'"),
                ),
            )
            .with_file(
                ContainerFileSource::present("META-INF/manifest.xml")
                    .with_signature(SignatureSource::new(1).variable("'manifest:version=\"1.2\"'")),
            ),
    );

    file.add_format(
        Format::new("fmt/111", "OLE2 Compound Document Format")
            .with_extension("doc")
            .with_extension("xls")
            .with_signature(500),
    );
    file.add_signature(SignatureSource::new(500).bof("D0CF11E0A1B11AE1"));
    file.add_container_trigger("fmt/111", ContainerKind::Ole2);

    file.add_format(
        Format::new("fmt/40", "Microsoft Word Document")
            .with_version("97-2003")
            .with_mime_type("application/msword")
            .with_extension("doc"),
    );
    file.add_container_signature(
        ContainerSignatureSource::new(1020, "fmt/40", ContainerKind::Ole2)
            .with_file(ContainerFileSource::present("WordDocument")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{ByteSource, ScanLimits};
    use crate::Registry;
    use formatid_core::MemoryResource;

    fn identifies(registry: &Registry, puid: &str, data: &[u8]) -> bool {
        let resource = MemoryResource::new(data.to_vec());
        let source = ByteSource::new(&resource);
        registry
            .signatures_for(puid)
            .iter()
            .any(|sig| sig.matches(&source, &ScanLimits::unlimited()).unwrap())
    }

    #[test]
    fn test_archive_signatures() {
        let registry = Registry::builtin();
        assert!(identifies(&registry, "x-fmt/263", b"PK\x03\x04rest"));
        assert!(identifies(&registry, "x-fmt/266", b"\x1f\x8b\x08\x00"));
        assert!(identifies(&registry, "fmt/411", b"Rar!\x1a\x07\x00\xcf"));
        assert!(!identifies(&registry, "fmt/411", b"Rar!\x1a\x07\x01\x00"));
        assert!(identifies(&registry, "fmt/613", b"Rar!\x1a\x07\x01\x00"));

        let mut tar = vec![0u8; 512];
        tar[257..263].copy_from_slice(b"ustar\0");
        tar[263..265].copy_from_slice(b"00");
        assert!(identifies(&registry, "x-fmt/265", &tar));

        let mut iso = vec![0u8; 32768 + 2048];
        iso[32768] = 1;
        iso[32769..32774].copy_from_slice(b"CD001");
        iso[32774] = 1;
        assert!(identifies(&registry, "fmt/468", &iso));
        assert!(!identifies(&registry, "fmt/468", &iso[..32770]));
    }

    #[test]
    fn test_document_signatures() {
        let registry = Registry::builtin();
        assert!(identifies(&registry, "fmt/18", b"%PDF-1.4\n1 0 obj\n%%EOF\r\n"));
        assert!(!identifies(&registry, "fmt/276", b"%PDF-1.4\n%%EOF"));
        assert!(identifies(&registry, "fmt/101", b"\xef\xbb\xbf<?xml version=\"1.0\"?>"));
        assert!(identifies(&registry, "fmt/96", b"<!DOCTYPE html>\n<HTML>\n"));
        assert!(!identifies(&registry, "fmt/96", b"<htmlish"));
    }

    #[test]
    fn test_image_signatures() {
        let registry = Registry::builtin();
        let mut jfif = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00\x01\x01".to_vec();
        jfif.extend_from_slice(&[0; 16]);
        jfif.extend_from_slice(b"\xff\xd9");
        assert!(identifies(&registry, "fmt/43", &jfif));
        assert!(identifies(&registry, "fmt/41", &jfif));

        assert!(identifies(&registry, "fmt/4", b"GIF89a\x01\x00\x01\x00\x00;"));
        assert!(!identifies(&registry, "fmt/3", b"GIF89a\x01\x00\x01\x00\x00;"));
    }
}
