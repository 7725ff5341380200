//! Core algorithms: keypoint extraction, match-and-solve, rolling map.

pub mod keypoints;
pub mod mapping;
pub mod matching;
