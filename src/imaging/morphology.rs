use std::collections::VecDeque;

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{Connectivity, connected_components};

use super::greyscale::GrayImageF;

const NEIGHBOURS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Grayscale reconstruction by dilation of `seed` under `mask`
/// (8-connectivity, hybrid raster scan plus queue propagation).
///
/// `seed` is clamped to `mask` first, so any seed works.
pub fn reconstruct_by_dilation(seed: &[f32], mask: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut j: Vec<f32> = seed.iter().zip(mask).map(|(s, m)| s.min(*m)).collect();
    let (w, h) = (width as i64, height as i64);
    let index = |x: i64, y: i64| -> Option<usize> {
        (x >= 0 && y >= 0 && x < w && y < h).then(|| (y * w + x) as usize)
    };

    // causal neighbours of the forward scan, reversed for the backward scan
    let before = &NEIGHBOURS_8[..4];
    let after = &NEIGHBOURS_8[4..];

    for y in 0..h {
        for x in 0..w {
            let p = (y * w + x) as usize;
            let mut value = j[p];
            for &(dx, dy) in before {
                if let Some(q) = index(x + dx, y + dy) {
                    value = value.max(j[q]);
                }
            }
            j[p] = value.min(mask[p]);
        }
    }

    let mut queue = VecDeque::new();
    for y in (0..h).rev() {
        for x in (0..w).rev() {
            let p = (y * w + x) as usize;
            let mut value = j[p];
            for &(dx, dy) in after {
                if let Some(q) = index(x + dx, y + dy) {
                    value = value.max(j[q]);
                }
            }
            j[p] = value.min(mask[p]);
            let pending = after.iter().any(|&(dx, dy)| {
                index(x + dx, y + dy).is_some_and(|q| j[q] < j[p] && j[q] < mask[q])
            });
            if pending {
                queue.push_back(p);
            }
        }
    }

    while let Some(p) = queue.pop_front() {
        let (x, y) = ((p % width) as i64, (p / width) as i64);
        for &(dx, dy) in &NEIGHBOURS_8 {
            if let Some(q) = index(x + dx, y + dy) {
                if j[q] < j[p] && mask[q] != j[q] {
                    j[q] = j[p].min(mask[q]);
                    queue.push_back(q);
                }
            }
        }
    }
    j
}

/// Removes the background by subtracting the reconstruction of the image
/// from its own border. Bright regions not connected to the border remain.
pub fn regional_maxima(image: &GrayImageF) -> Vec<f32> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mask = image.as_raw();
    let min = mask.iter().copied().fold(f32::INFINITY, f32::min);
    let mut seed = mask.clone();
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            seed[y * width + x] = min;
        }
    }
    let background = reconstruct_by_dilation(&seed, mask, width, height);
    mask.iter().zip(background).map(|(v, b)| v - b).collect()
}

/// Clears 4-connected foreground objects with fewer than `min_size` pixels.
pub fn remove_small_objects(mask: &GrayImage, min_size: usize) -> GrayImage {
    let labels = connected_components(mask, Connectivity::Four, Luma([0u8]));
    let count = labels.iter().copied().max().unwrap_or(0) as usize;
    let mut sizes = vec![0usize; count + 1];
    for &label in labels.iter() {
        sizes[label as usize] += 1;
    }
    let mut out = mask.clone();
    for (px, &label) in out.iter_mut().zip(labels.iter()) {
        if label != 0 && sizes[label as usize] < min_size {
            *px = 0;
        }
    }
    out
}

/// Binary opening with a disk of `radius`.
pub fn open_disk(mask: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::open(mask, Norm::L2, radius)
}

/// Binary dilation with a disk of `radius`.
pub fn dilate_disk(mask: &GrayImage, radius: u8) -> GrayImage {
    imageproc::morphology::dilate(mask, Norm::L2, radius)
}

/// Zhang-Suen thinning to one pixel wide 8-connected curves.
pub fn skeletonize(mask: &GrayImage) -> GrayImage {
    let (width, height) = (mask.width() as i64, mask.height() as i64);
    let mut on: Vec<bool> = mask.iter().map(|&v| v != 0).collect();
    let at = |on: &[bool], x: i64, y: i64| -> bool {
        x >= 0 && y >= 0 && x < width && y < height && on[(y * width + x) as usize]
    };

    loop {
        let mut changed = false;
        for step in 0..2 {
            let mut clear = Vec::new();
            for y in 0..height {
                for x in 0..width {
                    if !on[(y * width + x) as usize] {
                        continue;
                    }
                    // P2..P9 clockwise from north
                    let p = [
                        at(&on, x, y - 1),
                        at(&on, x + 1, y - 1),
                        at(&on, x + 1, y),
                        at(&on, x + 1, y + 1),
                        at(&on, x, y + 1),
                        at(&on, x - 1, y + 1),
                        at(&on, x - 1, y),
                        at(&on, x - 1, y - 1),
                    ];
                    let neighbours = p.iter().filter(|&&v| v).count();
                    if !(2..=6).contains(&neighbours) {
                        continue;
                    }
                    let transitions = (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count();
                    if transitions != 1 {
                        continue;
                    }
                    let (p2, p4, p6, p8) = (p[0], p[2], p[4], p[6]);
                    let removable = if step == 0 {
                        !(p2 && p4 && p6) && !(p4 && p6 && p8)
                    } else {
                        !(p2 && p4 && p8) && !(p2 && p6 && p8)
                    };
                    if removable {
                        clear.push((y * width + x) as usize);
                    }
                }
            }
            changed |= !clear.is_empty();
            for idx in clear {
                on[idx] = false;
            }
        }
        if !changed {
            break;
        }
    }

    let data = on.into_iter().map(|v| if v { 255 } else { 0 }).collect();
    GrayImage::from_raw(mask.width(), mask.height(), data)
        .unwrap_or_else(|| GrayImage::new(mask.width(), mask.height()))
}
