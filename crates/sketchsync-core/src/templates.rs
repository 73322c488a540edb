//! Starter templates for new scenes.

use std::fmt;
use std::str::FromStr;

use crate::error::UnknownTemplate;
use crate::scene::{Scene, Shape};

/// Content a freshly created scene can start from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Template {
    #[default]
    Blank,
    Presentation,
    Wireframe,
    Diagram,
}

impl Template {
    pub const ALL: [Template; 4] = [
        Template::Blank,
        Template::Presentation,
        Template::Wireframe,
        Template::Diagram,
    ];

    /// Identifier used on the command line and in share links
    pub fn id(self) -> &'static str {
        match self {
            Template::Blank => "blank",
            Template::Presentation => "presentation",
            Template::Wireframe => "wireframe",
            Template::Diagram => "diagram",
        }
    }

    /// Get display name
    pub fn name(self) -> &'static str {
        match self {
            Template::Blank => "Blank Canvas",
            Template::Presentation => "Presentation Slide",
            Template::Wireframe => "Wireframe",
            Template::Diagram => "Flowchart",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Template::Blank => "Start with an empty canvas",
            Template::Presentation => "Title and content layout",
            Template::Wireframe => "Basic UI wireframe layout",
            Template::Diagram => "Connected shapes for diagrams",
        }
    }

    /// Build the scene this template starts from
    pub fn scene(self) -> Scene {
        let mut scene = Scene::new();
        match self {
            Template::Blank => {}
            Template::Presentation => {
                scene.push(
                    Shape::text(100.0, 80.0, "Presentation Title", 48.0, "#1F2937")
                        .with("fontWeight", "bold"),
                );
                scene.push(Shape::text(100.0, 150.0, "Add your subtitle here", 24.0, "#6B7280"));
                scene.push(
                    Shape::rect(100.0, 220.0, 600.0, 300.0, "#F3F4F6")
                        .with("stroke", "#D1D5DB")
                        .with("strokeWidth", 2)
                        .with("rx", 8)
                        .with("ry", 8),
                );
                scene.push(Shape::text(120.0, 240.0, "Add your content here", 18.0, "#4B5563"));
            }
            Template::Wireframe => {
                let panels = [
                    (50.0, 50.0, 700.0, 80.0, "#E5E7EB", "Header", 70.0, 75.0, 20.0),
                    (50.0, 150.0, 200.0, 400.0, "#F3F4F6", "Sidebar", 70.0, 170.0, 16.0),
                    (270.0, 150.0, 480.0, 400.0, "#FFFFFF", "Main Content", 290.0, 170.0, 16.0),
                ];
                for (left, top, width, height, fill, label, lx, ly, size) in panels {
                    scene.push(
                        Shape::rect(left, top, width, height, fill)
                            .with("stroke", "#9CA3AF")
                            .with("strokeWidth", 2),
                    );
                    scene.push(Shape::text(lx, ly, label, size, "#374151"));
                }
            }
            Template::Diagram => {
                let step = |top: f64, fill: &str| {
                    Shape::rect(150.0, top, 150.0, 80.0, fill)
                        .with("rx", 8)
                        .with("ry", 8)
                };
                scene.push(step(100.0, "#3B82F6"));
                scene.push(Shape::text(200.0, 130.0, "Start", 18.0, "#FFFFFF"));
                scene.push(Shape::circle(175.0, 250.0, 60.0, "#10B981"));
                scene.push(Shape::text(195.0, 295.0, "Process", 16.0, "#FFFFFF"));
                scene.push(step(400.0, "#F97316"));
                scene.push(Shape::text(205.0, 430.0, "End", 18.0, "#FFFFFF"));
            }
        }
        scene
    }
}

impl FromStr for Template {
    type Err = UnknownTemplate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::ALL
            .into_iter()
            .find(|t| t.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTemplate(s.to_string()))
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
