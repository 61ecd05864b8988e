use imageproc::point::Point;

use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let mut image = Image::new(W as u32, H as u32);
    for (y, row) in data.iter().enumerate() {
        for (x, color) in row.iter().enumerate() {
            image.set(x as u32, y as u32, *color);
        }
    }
    image
}

fn count(image: &Image, color: Color) -> usize {
    (0..image.height())
        .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
        .filter(|&(x, y)| image.get(x, y) == color)
        .count()
}

#[test]
fn get_set() {
    let mut image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    assert_eq!(image.get(1, 0), C::GREEN);
    assert_eq!(image.get(0, 1), C::BLUE);

    image.set(1, 1, C::BLACK);
    assert_eq!(image.get(1, 1), C::BLACK);
    assert_eq!(image.data().len(), 2 * 2 * 4);
}

#[test]
fn clear() {
    let mut image = mkimage([[C::RED, C::GREEN]]);
    image.clear(C::WHITE);
    assert_eq!(count(&image, C::WHITE), 2);
}

#[test]
fn flip() {
    let mut image = mkimage([[C::RED, C::GREEN, C::BLUE], [C::WHITE, C::BLACK, C::BLACK]]);
    image.flip_horizontal_in_place();
    assert_eq!(
        image,
        mkimage([[C::BLUE, C::GREEN, C::RED], [C::BLACK, C::BLACK, C::WHITE]])
    );
}

#[test]
fn from_rgba8() {
    let image = Image::from_rgba8(Resolution::new(2, 1), &[255, 0, 0, 255, 0, 0, 255, 255]);
    assert_eq!(image, mkimage([[C::RED, C::BLUE]]));
}

#[test]
#[should_panic]
fn from_rgba8_size_mismatch() {
    Image::from_rgba8(Resolution::new(2, 2), &[0; 4]);
}

#[test]
fn filled_circle() {
    let mut image = Image::new(40, 40);
    image.clear(C::WHITE);
    draw::circle(&mut image, 20, 20, 5).filled();

    assert_eq!(image.get(20, 20), C::RED);
    assert_eq!(image.get(17, 22), C::RED);
    assert_eq!(image.get(27, 20), C::WHITE);
    assert_eq!(image.get(0, 0), C::WHITE);

    // a radius-5 disc covers roughly 5²π pixels
    let n = count(&image, C::RED);
    assert!((70..=100).contains(&n), "{n}");
}

#[test]
fn circle_outside_image_is_clipped() {
    let mut image = Image::new(10, 10);
    image.clear(C::WHITE);
    draw::circle(&mut image, -3, 4, 5).filled().color(C::BLUE);
    assert_eq!(image.get(0, 4), C::BLUE);
    assert_eq!(image.get(9, 4), C::WHITE);
}

#[test]
fn contour_outline() {
    let mut image = Image::new(40, 40);
    image.clear(C::WHITE);
    let points = [
        Point::new(5, 5),
        Point::new(25, 5),
        Point::new(25, 25),
        Point::new(5, 25),
    ];
    draw::contour(&mut image, &points);

    assert_eq!(image.get(15, 5), C::GREEN);
    assert_eq!(image.get(25, 15), C::GREEN);
    // closing edge from the last point back to the first
    assert_eq!(image.get(5, 15), C::GREEN);
    assert_eq!(image.get(15, 15), C::WHITE);
}

#[test]
fn text_draws_pixels() {
    let mut image = Image::new(200, 50);
    image.clear(C::WHITE);
    draw::text(&mut image, 10, 30, "Fingers: 5")
        .align_left()
        .align_baseline()
        .color(C::GREEN);

    assert!(count(&image, C::GREEN) > 0);
    for y in 0..image.height() {
        for x in 0..image.width() {
            if image.get(x, y) == C::GREEN {
                assert!(x >= 10, "text drawn left of its anchor at {x},{y}");
                assert!(y <= 35, "text drawn far below its baseline at {x},{y}");
            }
        }
    }
}

#[test]
fn color_debug() {
    assert_eq!(format!("{:?}", C::RED), "#ff0000ff");
    assert_eq!(format!("{:?}", C::from_rgb8(0, 0x80, 0xff)), "#0080ffff");
}

#[test]
fn text_edges_are_smoothed() {
    let mut image = Image::new(200, 50);
    image.clear(C::WHITE);
    draw::text(&mut image, 10, 30, "Fingers: 5")
        .align_left()
        .align_baseline()
        .color(C::GREEN);

    let mut partial = 0;
    for y in 0..image.height() {
        for x in 0..image.width() {
            let c = image.get(x, y);
            if c == C::WHITE || c == C::GREEN {
                continue;
            }
            // a mix of white and green
            assert_eq!((c.g(), c.a()), (255, 255), "{c:?} at {x},{y}");
            assert_eq!(c.r(), c.b(), "{c:?} at {x},{y}");
            partial += 1;
        }
    }
    assert!(partial > 0, "no partially covered edge pixels");
}

#[test]
fn wider_text_stroke_covers_more_pixels() {
    let draw = |width| {
        let mut image = Image::new(200, 50);
        image.clear(C::WHITE);
        draw::text(&mut image, 10, 30, "Fingers: 5")
            .align_left()
            .align_baseline()
            .stroke_width(width)
            .color(C::GREEN);
        count(&image, C::GREEN)
    };
    assert!(draw(2) > draw(1));
}
