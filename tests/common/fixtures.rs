use std::path::{Path, PathBuf};

use md_card_raster::{FontSet, FontSource};

/// Mixed document touching every block kind.
pub const KITCHEN_SINK: &str = "# Release notes\n\
\n\
The **parser** now keeps <span style=\"color:#1E90FF\">blue spans</span> and \
*italic* text, plus ~~struck~~ words and `inline code`.\n\
\n\
## Tasks\n\
\n\
- [x] ship the layout engine\n\
- [ ] benchmark large tables\n\
- nested list:\n\
  - second level\n\
\n\
1. first\n\
2. second\n\
\n\
| Module | Status |\n\
|:-------|-------:|\n\
| blocks | done |\n\
| markup | <font color=\"orange\">review</font> |\n\
\n\
> Cards are rendered in two passes: measure first, then draw.\n\
\n\
```text\n\
pass 1: resolve\n\
pass 2: compose\n\
```\n\
\n\
***\n\
\n\
Trailing paragraph.\n";

/// A long synthetic document for budgets and benches.
pub fn long_document(sections: usize) -> String {
    let mut doc = String::with_capacity(sections * 256);
    for idx in 0..sections {
        doc.push_str(&format!("## Section {idx}\n\n"));
        doc.push_str(
            "Paragraph text with **bold**, *italic*, and <span style=\"color:red\">red</span> \
             words that wraps across several lines of the card body.\n\n",
        );
        doc.push_str("- item one\n- [x] item two\n\n");
    }
    doc
}

const REGULAR_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
];

fn first_existing(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|path| path.exists())
}

/// System TrueType faces when a DejaVu-style pair is installed.
pub fn discover_system_fonts() -> Option<FontSet> {
    let regular = first_existing(REGULAR_CANDIDATES.iter().map(PathBuf::from))?;
    let dir = regular.parent().unwrap_or_else(|| Path::new("."));
    let stem = regular.file_stem()?.to_string_lossy().into_owned();
    let bold = first_existing([dir.join(format!("{stem}-Bold.ttf"))])?;
    let monospace = first_existing([dir.join(format!("{stem}Mono.ttf"))]);
    Some(FontSet {
        regular: Some(FontSource::Path(regular)),
        bold: Some(FontSource::Path(bold)),
        monospace: monospace.map(FontSource::Path),
        emoji: None,
        fallbacks: Vec::new(),
    })
}
