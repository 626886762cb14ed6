mod common;

use common::{DocxBuilder, NUMBERING, STYLES, image_p, list_item, p, styled_p};
use docxide_latex::{ConversionOptions, ErrorKind, TaskManager, TaskState};

/// Convert `docx` through the task lifecycle and return the LaTeX.
fn convert(docx: Vec<u8>, options: ConversionOptions) -> String {
    let manager = TaskManager::default();
    let id = manager.upload("input.docx", docx).unwrap();
    let status = manager.convert(&id, None, options).unwrap();
    assert_eq!(status.state, TaskState::Ready, "{:?}", status.failure);
    String::from_utf8(manager.download(&id).unwrap()).unwrap()
}

fn report_docx() -> Vec<u8> {
    DocxBuilder::new()
        .styles(STYLES)
        .numbering(NUMBERING)
        .image("rId5", "media/image1.png", common::png(8, 4))
        .body(&styled_p("Heading1", "Intro"))
        .body(&list_item(1, 0, "First point"))
        .body(&list_item(1, 0, "Second point"))
        .body(&image_p("rId5", 120, 60))
        .build()
}

#[test]
fn heading_list_and_image_in_order() {
    let _ = env_logger::try_init();
    let manager = TaskManager::default();
    let id = manager.upload("report.docx", report_docx()).unwrap();
    let status = manager
        .convert(&id, None, ConversionOptions::default())
        .unwrap();
    assert_eq!(status.state, TaskState::Ready);
    assert_eq!(status.media_count, 1);

    let latex = String::from_utf8(manager.download(&id).unwrap()).unwrap();
    let heading = latex.find("\\section*{Intro}").expect("heading");
    let list = latex.find("\\begin{enumerate}").expect("list");
    let first = latex.find("\\item First point").expect("first item");
    let second = latex.find("\\item Second point").expect("second item");
    let end = latex.find("\\end{enumerate}").expect("list end");
    let image = latex
        .find("\\includegraphics[width=120.0pt]{media/image1.png}")
        .expect("image");
    assert!(heading < list && list < first && first < second && second < end && end < image);
    assert_eq!(latex.matches("\\includegraphics").count(), 1);

    let bundle = manager.download_complete(&id).unwrap();
    let names = common::zip_names(&bundle);
    assert!(names.contains(&"media/image1.png".to_string()));
}

#[test]
fn special_characters_are_escaped_once() {
    let docx = DocxBuilder::new()
        .body(&p("Profit &amp; Loss: 50% of #1 in file_name costs $5 {x}"))
        .build();
    let latex = convert(docx, ConversionOptions::default());
    assert!(latex.contains(
        "Profit \\& Loss: 50\\% of \\#1 in file\\_name costs \\$5 \\{x\\}"
    ));
    assert!(!latex.contains("\\\\&"));
}

#[test]
fn toc_option_only_changes_toc_and_headings() {
    let docx = || {
        DocxBuilder::new()
            .styles(STYLES)
            .body(&styled_p("Heading1", "Alpha"))
            .body(&p("Body text"))
            .body(&styled_p("Heading2", "Beta"))
            .build()
    };
    let with_toc = convert(
        docx(),
        ConversionOptions {
            generate_toc: true,
            ..Default::default()
        },
    );
    let without = convert(docx(), ConversionOptions::default());

    assert!(with_toc.contains("\\tableofcontents"));
    assert!(with_toc.contains("\\section{Alpha}"));
    assert!(with_toc.contains("\\subsection{Beta}"));
    assert!(!without.contains("\\tableofcontents"));

    let normalized = with_toc
        .replace("\\tableofcontents\n\\newpage\n\n", "")
        .replace("\\section{", "\\section*{")
        .replace("\\subsection{", "\\subsection*{");
    assert_eq!(normalized, without);
}

#[test]
fn media_can_be_left_out() {
    let manager = TaskManager::default();
    let id = manager.upload("report.docx", report_docx()).unwrap();
    let options = ConversionOptions {
        extract_media: false,
        ..Default::default()
    };
    let status = manager.convert(&id, None, options).unwrap();
    assert_eq!(status.media_count, 0);

    let latex = String::from_utf8(manager.download(&id).unwrap()).unwrap();
    assert!(!latex.contains("\\includegraphics"));
    assert!(latex.contains("% image omitted: media/image1.png"));

    let names = common::zip_names(&manager.download_complete(&id).unwrap());
    assert!(names.iter().all(|n| !n.starts_with("media/")));
}

#[test]
fn media_root_applies_outside_overleaf_mode() {
    let outside = ConversionOptions {
        overleaf_compatible: false,
        media_root: Some("/srv/project".into()),
        ..Default::default()
    };
    let latex = convert(report_docx(), outside);
    assert!(latex.contains("{/srv/project/media/image1.png}"));

    let overleaf = ConversionOptions {
        media_root: Some("/srv/project".into()),
        ..Default::default()
    };
    let latex = convert(report_docx(), overleaf);
    assert!(latex.contains("{media/image1.png}"));
    assert!(!latex.contains("/srv/project"));
}

#[test]
fn gif_images_are_bundled_as_png() {
    let docx = DocxBuilder::new()
        .image("rId7", "media/anim.gif", common::gif(3, 3))
        .body(&image_p("rId7", 30, 30))
        .build();
    let manager = TaskManager::default();
    let id = manager.upload("gif.docx", docx).unwrap();
    manager
        .convert(&id, None, ConversionOptions::default())
        .unwrap();

    let latex = String::from_utf8(manager.download(&id).unwrap()).unwrap();
    assert!(latex.contains("{media/anim.png}"));
    let bundle = manager.download_complete(&id).unwrap();
    let png = common::zip_entry(&bundle, "media/anim.png");
    assert_eq!(&png[..4], b"\x89PNG");
}

#[test]
fn transcoded_and_native_images_keep_distinct_names() {
    let png = common::png(5, 5);
    let docx = DocxBuilder::new()
        .image("rId7", "media/logo.gif", common::gif(3, 3))
        .image("rId8", "media/logo.png", png.clone())
        .body(&image_p("rId7", 30, 30))
        .body(&image_p("rId8", 30, 30))
        .build();
    let manager = TaskManager::default();
    let id = manager.upload("logos.docx", docx).unwrap();
    let status = manager
        .convert(&id, None, ConversionOptions::default())
        .unwrap();
    assert_eq!(status.media_count, 2);

    let latex = String::from_utf8(manager.download(&id).unwrap()).unwrap();
    assert!(latex.contains("{media/logo.png}"));
    assert!(latex.contains("{media/logo_2.png}"));
    let bundle = manager.download_complete(&id).unwrap();
    assert_eq!(common::zip_entry(&bundle, "media/logo_2.png"), png);
}

#[test]
fn footnotes_and_hyperlinks() {
    let docx = DocxBuilder::new()
        .hyperlink("rId9", "https://example.com/a_b#c")
        .footnotes(r#"<w:footnote w:id="1"><w:p><w:r><w:t>Source 100%</w:t></w:r></w:p></w:footnote>"#)
        .body(
            r#"<w:p><w:r><w:t>Claim</w:t></w:r><w:r><w:footnoteReference w:id="1"/></w:r>
               <w:r><w:t xml:space="preserve"> see </w:t></w:r>
               <w:hyperlink r:id="rId9"><w:r><w:t>docs</w:t></w:r></w:hyperlink></w:p>"#,
        )
        .build();
    let latex = convert(docx, ConversionOptions::default());
    assert!(latex.contains("Claim\\footnote{Source 100\\%}"));
    assert!(latex.contains("\\href{https://example.com/a_b\\#c}{docs}"));
}

fn table_docx() -> Vec<u8> {
    let cell = |text: &str| format!("<w:tc><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:tc>");
    DocxBuilder::new()
        .body(&format!(
            r#"<w:tbl><w:tblGrid><w:gridCol w:w="2000"/><w:gridCol w:w="2000"/></w:tblGrid>
               <w:tr><w:trPr><w:tblHeader/></w:trPr>{}{}</w:tr>
               <w:tr><w:tc><w:tcPr><w:gridSpan w:val="2"/></w:tcPr><w:p><w:r><w:t>Both</w:t></w:r></w:p></w:tc></w:tr>
               </w:tbl>"#,
            cell("Name"),
            cell("Value &amp; unit")
        ))
        .build()
}

#[test]
fn tables_with_booktabs() {
    let latex = convert(table_docx(), ConversionOptions::default());
    assert!(latex.contains("\\begin{table}[H]\n\\centering\n"));
    assert!(latex.contains("\\begin{tabular}{p{0.450\\linewidth}p{0.450\\linewidth}}"));
    assert!(latex.contains("\\toprule\nName & Value \\& unit \\\\\n\\midrule\n"));
    assert!(latex.contains("\\multicolumn{2}{p{0.900\\linewidth}}{Both} \\\\\n\\bottomrule"));
    assert!(latex.contains("\\usepackage{booktabs}"));
}

#[test]
fn plain_tables_without_styles() {
    let options = ConversionOptions {
        preserve_styles: false,
        ..Default::default()
    };
    let latex = convert(table_docx(), options);
    assert!(latex.contains("\\begin{tabular}{|p{0.450\\linewidth}|p{0.450\\linewidth}|}"));
    assert!(latex.contains("\\hline"));
    assert!(!latex.contains("booktabs"));
    assert!(!latex.contains("\\begin{table}"));
}

#[test]
fn run_formatting_follows_styles() {
    let docx = DocxBuilder::new()
        .styles(STYLES)
        .body(
            r#"<w:p><w:r><w:rPr><w:b/><w:i/></w:rPr><w:t>loud</w:t></w:r>
               <w:r><w:rPr><w:rStyle w:val="Strong"/></w:rPr><w:t xml:space="preserve"> strong</w:t></w:r>
               <w:r><w:rPr><w:strike/></w:rPr><w:t xml:space="preserve"> gone</w:t></w:r></w:p>"#,
        )
        .build();
    let latex = convert(docx, ConversionOptions::default());
    assert!(latex.contains("\\textbf{\\textit{loud}}"));
    assert!(latex.contains("\\textbf{ strong}"));
    assert!(latex.contains("\\sout{ gone}"));
    assert!(latex.contains("\\usepackage[normalem]{ulem}"));
}

#[test]
fn line_breaks_and_empty_paragraphs() {
    let docx = || {
        DocxBuilder::new()
            .body(r#"<w:p><w:r><w:t>one</w:t><w:br/><w:t>two</w:t></w:r></w:p>"#)
            .body("<w:p/>")
            .body(&p("three"))
            .build()
    };
    let on = convert(docx(), ConversionOptions::default());
    assert!(on.contains("one\\\\\ntwo"));
    assert!(on.contains("\\medskip"));

    let off = convert(
        docx(),
        ConversionOptions {
            preserve_line_breaks: false,
            ..Default::default()
        },
    );
    assert!(off.contains("one two"));
    assert!(!off.contains("\\medskip"));
}

#[test]
fn title_and_deep_headings() {
    let docx = DocxBuilder::new()
        .styles(STYLES)
        .body(&styled_p("Title", "Annual Report"))
        .body(
            r#"<w:p><w:pPr><w:outlineLvl w:val="7"/></w:pPr><w:r><w:t>Deep</w:t></w:r></w:p>"#,
        )
        .build();
    let latex = convert(
        docx,
        ConversionOptions {
            generate_toc: true,
            ..Default::default()
        },
    );
    assert!(latex.contains("\\title{Annual Report}"));
    let make = latex.find("\\maketitle").unwrap();
    let toc = latex.find("\\tableofcontents").unwrap();
    assert!(make < toc);
    assert!(latex.contains("\\subparagraph{Deep}"));
}

#[test]
fn equations_are_skipped_with_warning() {
    let docx = DocxBuilder::new()
        .body(&p("Before"))
        .body("<m:oMathPara><m:oMath><m:r><m:t>x</m:t></m:r></m:oMath></m:oMathPara>")
        .body(&p("After"))
        .build();
    let manager = TaskManager::default();
    let id = manager.upload("math.docx", docx).unwrap();
    let status = manager
        .convert(&id, None, ConversionOptions::default())
        .unwrap();
    assert_eq!(status.state, TaskState::Ready);
    assert!(status.warnings.iter().any(|w| w.element == "oMathPara"));
    let latex = String::from_utf8(manager.download(&id).unwrap()).unwrap();
    assert!(latex.contains("Before") && latex.contains("After"));
}

#[test]
fn library_entry_point_matches_tasks() {
    let options = ConversionOptions::default();
    let direct = docxide_latex::convert_docx_bytes_to_latex(&report_docx(), &options).unwrap();
    assert_eq!(direct.latex, convert(report_docx(), options));
    assert_eq!(direct.manifest.len(), 1);
}

#[test]
fn bracketed_text_after_items_and_breaks() {
    let docx = DocxBuilder::new()
        .numbering(NUMBERING)
        .body(&list_item(1, 0, "[draft] first"))
        .body(
            r#"<w:p><w:r><w:t>line</w:t><w:br/><w:t>[2] second</w:t></w:r></w:p>"#,
        )
        .build();
    let latex = convert(docx, ConversionOptions::default());
    assert!(latex.contains("\\item {}[draft] first"), "{latex}");
    assert!(latex.contains("line\\\\\n{}[2] second"), "{latex}");
}

#[test]
fn template_from_json_options() {
    let options: ConversionOptions = serde_json::from_str(
        r#"{
            "generateToc": true,
            "template": "\\documentclass{report}\n$header-includes$\n\\begin{document}\n$if(toc)$\\tableofcontents\n$endif$$body$\n\\end{document}\n"
        }"#,
    )
    .unwrap();
    let latex = convert(report_docx(), options);
    assert!(latex.starts_with("\\documentclass{report}\n\\usepackage[utf8]{inputenc}"));
    assert!(latex.contains("\\begin{document}\n\\tableofcontents\n"));
    assert!(latex.contains("\\section{Intro}"));
    assert!(latex.ends_with("\\end{document}\n"));
}

#[test]
fn bad_template_or_media_root_fails_the_task() {
    let manager = TaskManager::default();
    let cases = [
        (
            ConversionOptions {
                template: Some("\\begin{document}\\end{document}".into()),
                ..Default::default()
            },
            ErrorKind::InvalidTemplate,
        ),
        (
            ConversionOptions {
                overleaf_compatible: false,
                media_root: Some("/srv/100%/project".into()),
                ..Default::default()
            },
            ErrorKind::InvalidOptions,
        ),
    ];
    for (options, kind) in cases {
        let id = manager.upload("report.docx", report_docx()).unwrap();
        let status = manager.convert(&id, None, options).unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.failure.unwrap().kind, kind);
    }
}
