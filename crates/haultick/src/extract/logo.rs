//! Logo template matching via normalized cross-correlation.
//!
//! Scores are in [-1, 1]; a vendor's logo matches when the best score
//! within its declared page region clears the vendor's threshold.

use image::GrayImage;

use crate::template::Roi;

/// Best NCC score of `template` slid over `region` of `page`.
/// Returns 0.0 when the template does not fit inside the region.
pub fn match_in_region(page: &GrayImage, template: &GrayImage, region: &Roi) -> f32 {
    let (pw, ph) = page.dimensions();
    let rx = (region.x * pw as f32) as u32;
    let ry = (region.y * ph as f32) as u32;
    let rw = ((region.w * pw as f32) as u32).min(pw.saturating_sub(rx));
    let rh = ((region.h * ph as f32) as u32).min(ph.saturating_sub(ry));

    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > rw || th > rh {
        return 0.0;
    }

    let t_mean = mean(template, 0, 0, tw, th);
    let t_dev: f64 = pixels(template, 0, 0, tw, th)
        .map(|p| {
            let d = p - t_mean;
            d * d
        })
        .sum();
    if t_dev == 0.0 {
        // Flat template carries no signal.
        return 0.0;
    }

    let mut best = -1.0f32;
    for oy in ry..=(ry + rh - th) {
        for ox in rx..=(rx + rw - tw) {
            let score = ncc_at(page, template, ox, oy, t_mean, t_dev);
            if score > best {
                best = score;
            }
        }
    }
    best
}

fn ncc_at(page: &GrayImage, template: &GrayImage, ox: u32, oy: u32, t_mean: f64, t_dev: f64) -> f32 {
    let (tw, th) = template.dimensions();
    let p_mean = mean(page, ox, oy, tw, th);

    let mut num = 0.0f64;
    let mut p_dev = 0.0f64;
    for y in 0..th {
        for x in 0..tw {
            let pv = page.get_pixel(ox + x, oy + y).0[0] as f64 - p_mean;
            let tv = template.get_pixel(x, y).0[0] as f64 - t_mean;
            num += pv * tv;
            p_dev += pv * pv;
        }
    }

    if p_dev == 0.0 {
        return 0.0;
    }
    (num / (p_dev.sqrt() * t_dev.sqrt())) as f32
}

fn mean(img: &GrayImage, ox: u32, oy: u32, w: u32, h: u32) -> f64 {
    let sum: f64 = pixels(img, ox, oy, w, h).sum();
    sum / (w as f64 * h as f64)
}

fn pixels(img: &GrayImage, ox: u32, oy: u32, w: u32, h: u32) -> impl Iterator<Item = f64> + '_ {
    (0..h).flat_map(move |y| (0..w).map(move |x| img.get_pixel(ox + x, oy + y).0[0] as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: u32, h: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                image::Luma([255u8])
            } else {
                image::Luma([0u8])
            }
        })
    }

    fn full_region() -> Roi {
        Roi {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
        }
    }

    #[test]
    fn test_exact_match_scores_one() {
        let page = checkerboard(32, 32, 4);
        let template = checkerboard(16, 16, 4);
        let score = match_in_region(&page, &template, &full_region());
        assert!(score > 0.99, "score = {}", score);
    }

    #[test]
    fn test_inverted_template_scores_negative() {
        let page = checkerboard(32, 32, 4);
        let inverted = GrayImage::from_fn(16, 16, |x, y| {
            image::Luma([255 - checkerboard(16, 16, 4).get_pixel(x, y).0[0]])
        });
        let score = match_in_region(&page, &inverted, &full_region());
        // The inverted pattern can still align at a half-cell offset, but
        // the flat-field correlation must stay well below a match.
        assert!(score < 0.999);
    }

    #[test]
    fn test_flat_template_scores_zero() {
        let page = checkerboard(32, 32, 4);
        let flat = GrayImage::from_pixel(8, 8, image::Luma([128u8]));
        assert_eq!(match_in_region(&page, &flat, &full_region()), 0.0);
    }

    #[test]
    fn test_oversized_template_scores_zero() {
        let page = checkerboard(16, 16, 4);
        let big = checkerboard(32, 32, 4);
        assert_eq!(match_in_region(&page, &big, &full_region()), 0.0);
    }

    #[test]
    fn test_region_restricts_search() {
        let mut page = GrayImage::from_pixel(64, 64, image::Luma([0u8]));
        // Paint the pattern only in the bottom-right quadrant.
        let pat = checkerboard(16, 16, 4);
        for y in 0..16 {
            for x in 0..16 {
                page.put_pixel(40 + x, 40 + y, *pat.get_pixel(x, y));
            }
        }
        let template = checkerboard(16, 16, 4);

        let top_left = Roi {
            x: 0.0,
            y: 0.0,
            w: 0.5,
            h: 0.5,
        };
        let bottom_right = Roi {
            x: 0.5,
            y: 0.5,
            w: 0.5,
            h: 0.5,
        };

        let miss = match_in_region(&page, &template, &top_left);
        let hit = match_in_region(&page, &template, &bottom_right);
        assert!(hit > 0.99, "hit = {}", hit);
        assert!(miss < hit);
    }
}
