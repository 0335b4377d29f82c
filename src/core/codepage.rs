//! Purpose: Name the codepage byte declared in a table header.
//! Exports: `Codepage`.
//! Role: Metadata only; transcoding belongs to the storage engine.
//! Invariants: Unknown bytes stay representable and report as unsupported.
use std::fmt;

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Codepage(pub u8);

struct CodepageInfo {
    id: u8,
    ms_codepage: u16,
    name: &'static str,
}

const KNOWN_CODEPAGES: &[CodepageInfo] = &[
    CodepageInfo { id: 0x01, ms_codepage: 437, name: "U.S. MS-DOS" },
    CodepageInfo { id: 0x69, ms_codepage: 620, name: "Mazovia (Polish) MS-DOS" },
    CodepageInfo { id: 0x6A, ms_codepage: 737, name: "Greek MS-DOS (437G)" },
    CodepageInfo { id: 0x02, ms_codepage: 850, name: "International MS-DOS" },
    CodepageInfo { id: 0x64, ms_codepage: 852, name: "Eastern European MS-DOS" },
    CodepageInfo { id: 0x6B, ms_codepage: 857, name: "Turkish MS-DOS" },
    CodepageInfo { id: 0x67, ms_codepage: 861, name: "Icelandic MS-DOS" },
    CodepageInfo { id: 0x66, ms_codepage: 865, name: "Nordic MS-DOS" },
    CodepageInfo { id: 0x65, ms_codepage: 866, name: "Russian MS-DOS" },
    CodepageInfo { id: 0x7C, ms_codepage: 874, name: "Thai Windows" },
    CodepageInfo { id: 0x68, ms_codepage: 895, name: "Kamenicky (Czech) MS-DOS" },
    CodepageInfo { id: 0x7B, ms_codepage: 932, name: "Japanese Windows" },
    CodepageInfo { id: 0x7A, ms_codepage: 936, name: "Chinese Simplified (PRC, Singapore) Windows" },
    CodepageInfo { id: 0x79, ms_codepage: 949, name: "Korean Windows" },
    CodepageInfo { id: 0x78, ms_codepage: 950, name: "Traditional Chinese (Hong Kong SAR, Taiwan) Windows" },
    CodepageInfo { id: 0xC8, ms_codepage: 1250, name: "Eastern European Windows" },
    CodepageInfo { id: 0xC9, ms_codepage: 1251, name: "Russian Windows" },
    CodepageInfo { id: 0x03, ms_codepage: 1252, name: "Windows ANSI" },
    CodepageInfo { id: 0xCB, ms_codepage: 1253, name: "Greek Windows" },
    CodepageInfo { id: 0xCA, ms_codepage: 1254, name: "Turkish Windows" },
    CodepageInfo { id: 0x7D, ms_codepage: 1255, name: "Hebrew Windows" },
    CodepageInfo { id: 0x7E, ms_codepage: 1256, name: "Arabic Windows" },
    CodepageInfo { id: 0x04, ms_codepage: 10000, name: "Standard Macintosh" },
    CodepageInfo { id: 0x98, ms_codepage: 10006, name: "Greek Macintosh" },
    CodepageInfo { id: 0x96, ms_codepage: 10007, name: "Russian Macintosh" },
    CodepageInfo { id: 0x97, ms_codepage: 10029, name: "Macintosh EE" },
];

const SUPPORTED: &[u8] = &[0x03];

impl Codepage {
    fn info(self) -> Option<&'static CodepageInfo> {
        KNOWN_CODEPAGES.iter().find(|info| info.id == self.0)
    }

    pub fn name(self) -> &'static str {
        self.info()
            .map(|info| info.name)
            .unwrap_or("Unknown / Unsupported Codepage")
    }

    /// Visual FoxPro codepage byte; 0 when the byte is not a known codepage.
    pub fn vfp_id(self) -> u8 {
        self.info().map(|info| info.id).unwrap_or(0)
    }

    /// Windows codepage number; 0 when unknown.
    pub fn ms_codepage(self) -> u16 {
        self.info().map(|info| info.ms_codepage).unwrap_or(0)
    }

    pub fn is_supported(self) -> bool {
        SUPPORTED.contains(&self.0)
    }
}

impl fmt::Display for Codepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
