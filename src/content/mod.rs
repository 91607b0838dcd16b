//! Prompt builders for each content type.
//!
//! These are deliberately thin: each one formats a prompt string and
//! returns a [`GenerationRequest`]. All quota discipline, retries, and
//! tracking live in the throttled client; nothing here owns state or talks
//! to the provider.

use clap::ValueEnum;
use std::fmt;

use crate::models::{Attachment, GenerationRequest};

/// Join a list of grades as "3, 4, 5".
fn join_grades(grades: &[u8]) -> String {
    grades
        .iter()
        .map(|g| g.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Educational story in a local language.
pub fn story(language: &str, grade: u8, topic: &str, context: &str) -> GenerationRequest {
    GenerationRequest::text(format!(
        "Create a short educational story in {language} for grade {grade} students about {topic}.\n\
         The story should:\n\
         - Be 150-200 words\n\
         - Include a farmer or village character\n\
         - Use simple vocabulary appropriate for grade {grade}\n\
         - Include local context from {context}\n\
         - End with a clear moral or learning point"
    ))
}

/// Differentiated worksheets from a photographed textbook page.
pub fn worksheet_from_image(grades: &[u8], page: Attachment) -> GenerationRequest {
    GenerationRequest::text(format!(
        "Look at this textbook page and create differentiated worksheets for grades: {}.\n\n\
         For each grade, create:\n\
         - 3-5 questions appropriate for their level\n\
         - A mix of fill-in-the-blanks, multiple choice, and short answer questions\n\
         - Progressively harder questions for higher grades\n\
         - Simple English that rural students can understand\n\
         - A fun activity or drawing exercise at the end",
        join_grades(grades)
    ))
    .with_attachment(page)
}

/// Concept explanation using rural analogies.
pub fn explain_concept(question: &str, language: &str, grade: u8) -> GenerationRequest {
    GenerationRequest::text(format!(
        "A grade {grade} student asks: \"{question}\"\n\n\
         Explain this in {language} using:\n\
         - A simple analogy from village or rural life\n\
         - Examples they can relate to (farming, nature, daily village activities)\n\
         - Under 100 words, memorable and easy to understand"
    ))
}

/// Step-by-step drawing instructions for a visual aid.
pub fn visual_aid(concept: &str, medium: &str) -> GenerationRequest {
    GenerationRequest::text(format!(
        "Create simple {medium} drawing instructions for teaching the concept: {concept}.\n\n\
         Provide:\n\
         1. Step-by-step instructions using basic shapes (circles, lines, squares)\n\
         2. Each step completable in 30 seconds, total time under 5 minutes\n\
         3. Labels in both English and the local language\n\
         4. A simpler alternative version students can copy\n\n\
         Format as clear, numbered steps."
    ))
}

/// Reading assessment criteria for a passage.
pub fn reading_assessment(text: &str, language: &str, grade: u8) -> GenerationRequest {
    GenerationRequest::text(format!(
        "Create a reading assessment for grade {grade} students reading this text in {language}:\n\n\
         Text: \"{text}\"\n\n\
         Provide:\n\
         1. Key words to check for pronunciation\n\
         2. Expected reading speed (words per minute)\n\
         3. Common mistakes to watch for\n\
         4. Encouraging feedback suggestions in {language}\n\
         5. A simple 1-5 scoring rubric\n\
         6. Follow-up comprehension questions"
    ))
}

/// Catalogue of supported classroom game formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GameKind {
    VocabularyBingo,
    MathPuzzle,
    ScienceQuiz,
    MemoryGame,
    WordBuilding,
    NumberRace,
    StorySequence,
    ShapeHunt,
}

impl GameKind {
    /// Human-readable description used in the prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Self::VocabularyBingo => "Vocabulary Bingo - a word recognition game",
            Self::MathPuzzle => "Math Puzzle - number and calculation game",
            Self::ScienceQuiz => "Science Quiz - question-based learning game",
            Self::MemoryGame => "Memory Game - matching pairs for better recall",
            Self::WordBuilding => "Word Building - create words from letters",
            Self::NumberRace => "Number Race - competitive math practice",
            Self::StorySequence => "Story Sequencing - arrange events in order",
            Self::ShapeHunt => "Shape Hunt - identify shapes in surroundings",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Classroom game playable with minimal resources.
pub fn educational_game(kind: GameKind, topic: &str, grade: u8, language: &str) -> GenerationRequest {
    GenerationRequest::text(format!(
        "Create a {kind} game for grade {grade} students about {topic} in {language}.\n\n\
         Include:\n\
         1. Clear game objective and learning goals\n\
         2. Materials needed (simple, locally available items like stones, sticks, chalk)\n\
         3. Step-by-step instructions for teachers\n\
         4. Easy-to-understand game rules\n\
         5. Easier and harder variations\n\
         6. Time duration within 15-20 minutes\n\
         7. How to assess learning through the game\n\n\
         Make it suitable for a classroom of 20-40 students with minimal resources."
    ))
}

/// Multi-grade lesson plan.
pub fn lesson_plan(
    goals: &str,
    subjects: &[String],
    grades: &[u8],
    duration: &str,
    language: &str,
) -> GenerationRequest {
    GenerationRequest::text(format!(
        "Create a detailed {duration} lesson plan for a multi-grade classroom with grades {}.\n\n\
         Subjects to cover: {}\n\
         Goals: {goals}\n\n\
         Structure the plan with:\n\
         1. Daily breakdown (Monday to Saturday)\n\
         2. A timetable with specific slots (9 AM to 3 PM)\n\
         3. Grade-specific activities that can run simultaneously\n\
         4. Common activities for all grades (assembly, lunch, games)\n\
         5. Materials needed, favoring locally available low-cost items\n\
         6. Quick daily assessment methods\n\
         7. Grade-appropriate homework\n\
         8. Backup activities if the main plan does not work\n\n\
         Format in {language} and keep it practical for schools with limited resources.",
        join_grades(grades),
        subjects.join(", ")
    ))
}
