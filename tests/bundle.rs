mod common;

use common::{DocxBuilder, image_p, p};
use docxide_latex::{ConversionOptions, TaskId, TaskManager};

fn two_images() -> Vec<u8> {
    DocxBuilder::new()
        .image("rId8", "media/zebra.png", common::png(5, 5))
        .image("rId4", "media/apple.png", common::png(6, 3))
        .body(&p("Pictures follow."))
        .body(&image_p("rId8", 50, 50))
        .body(&image_p("rId4", 60, 30))
        .build()
}

fn ready(manager: &TaskManager, docx: Vec<u8>) -> TaskId {
    let id = manager.upload("pictures.docx", docx).unwrap();
    manager
        .convert(&id, Some("pictures.tex"), ConversionOptions::default())
        .unwrap();
    id
}

#[test]
fn complete_bundle_layout() {
    let _ = env_logger::try_init();
    let manager = TaskManager::default();
    let id = ready(&manager, two_images());
    let bundle = manager.download_complete(&id).unwrap();

    assert_eq!(
        common::zip_names(&bundle),
        [
            "pictures.tex",
            "media/apple.png",
            "media/zebra.png",
            "README.txt"
        ]
    );
    let tex = common::zip_entry(&bundle, "pictures.tex");
    assert_eq!(tex, manager.download(&id).unwrap());
    let readme = String::from_utf8(common::zip_entry(&bundle, "README.txt")).unwrap();
    assert!(readme.contains("pdflatex pictures.tex"));
    assert!(readme.contains("Overleaf"));
}

#[test]
fn downloads_are_idempotent() {
    let manager = TaskManager::default();
    let id = ready(&manager, two_images());
    assert_eq!(manager.download(&id).unwrap(), manager.download(&id).unwrap());
    assert_eq!(
        manager.download_complete(&id).unwrap(),
        manager.download_complete(&id).unwrap()
    );
    assert_eq!(
        manager.download_media(&id).unwrap(),
        manager.download_media(&id).unwrap()
    );
}

#[test]
fn identical_inputs_give_identical_archives() {
    let manager = TaskManager::default();
    let a = ready(&manager, two_images());
    let b = ready(&manager, two_images());
    assert_ne!(a, b);
    assert_eq!(
        manager.download_complete(&a).unwrap(),
        manager.download_complete(&b).unwrap()
    );
}

#[test]
fn media_only_archive() {
    let manager = TaskManager::default();
    let id = ready(&manager, two_images());
    let media = manager.download_media(&id).unwrap();
    assert_eq!(
        common::zip_names(&media),
        ["media/apple.png", "media/zebra.png"]
    );
    assert_eq!(
        common::zip_entry(&media, "media/apple.png"),
        common::png(6, 3)
    );
}

#[test]
fn shared_image_part_is_bundled_once() {
    let docx = DocxBuilder::new()
        .image("rId2", "media/logo.png", common::png(2, 2))
        .body(&image_p("rId2", 20, 20))
        .body(&image_p("rId2", 20, 20))
        .build();
    let manager = TaskManager::default();
    let id = ready(&manager, docx);
    let latex = String::from_utf8(manager.download(&id).unwrap()).unwrap();
    assert_eq!(latex.matches("{media/logo.png}").count(), 2);
    let names = common::zip_names(&manager.download_complete(&id).unwrap());
    assert_eq!(names.iter().filter(|n| n.starts_with("media/")).count(), 1);
}
